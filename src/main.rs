use clap::Parser;
use opentell::cli::{Cli, Command};
use opentell::config::state_dir;
use opentell::store::Store;
use opentell::{OpentellError, config, context, hooks, promote, update, worker};
use std::process::ExitCode;

fn run() -> Result<(), OpentellError> {
    let cli = Cli::parse();
    let dir = state_dir(cli.dir);

    match cli.command {
        // Hook and worker paths swallow all errors internally: the host must
        // only ever see exit 0 from them.
        Command::Hook => {
            hooks::handle_hook(&dir);
            Ok(())
        }
        Command::ClassifyWorker => {
            worker::run(&dir);
            Ok(())
        }
        Command::Context => {
            let store = Store::open(&dir)?;
            let config = config::load_config(&dir);
            let injection = context::build(&store, config.confidence_threshold);
            if injection.is_empty() {
                eprintln!("opentell: nothing to inject yet");
            } else {
                print!("{injection}");
            }
            Ok(())
        }
        Command::Status => {
            let store = Store::open(&dir)?;
            let config = config::load_config(&dir);
            let doc = store.load();
            let active = doc
                .learnings
                .iter()
                .filter(|l| l.active(config.confidence_threshold))
                .count();
            let inferred = doc
                .learnings
                .iter()
                .filter(|l| l.inferred && !l.archived)
                .count();
            let archived = doc.learnings.iter().filter(|l| l.archived).count();
            let promoted = doc.learnings.iter().filter(|l| l.promoted).count();
            let wal_depth = store.drain_wal().len();
            println!("state dir:  {}", dir.display());
            println!("learnings:  {} total", doc.learnings.len());
            println!("  active:   {active}");
            println!("  inferred: {inferred}");
            println!("  archived: {archived}");
            println!("  promoted: {promoted}");
            println!("sessions:   {}", doc.meta.total_sessions);
            println!("wal depth:  {wal_depth}");
            Ok(())
        }
        Command::Learnings(args) => {
            let store = Store::open(&dir)?;
            for l in store.get_all() {
                if !args.all && (l.archived || l.promoted) {
                    continue;
                }
                let mut flags = Vec::new();
                if l.inferred {
                    flags.push("inferred");
                }
                if l.archived {
                    flags.push("archived");
                }
                if l.promoted {
                    flags.push("promoted");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(","))
                };
                println!(
                    "{}  {:.2}  {:<17} {}{}",
                    l.id,
                    l.confidence,
                    l.classification.as_str(),
                    l.text,
                    flags
                );
            }
            Ok(())
        }
        Command::Promote(args) => {
            let store = Store::open(&dir)?;
            let target = args.file.unwrap_or_else(|| "CLAUDE.md".into());
            let promoted = promote::promote(&store, &target)?;
            if promoted.is_empty() {
                eprintln!("opentell: nothing promotable");
            } else {
                eprintln!("opentell: promoted {} learnings → {}", promoted.len(), target.display());
            }
            Ok(())
        }
        Command::Accept(args) => {
            let store = Store::open(&dir)?;
            if store.accept_observation(&args.id)? {
                eprintln!("opentell: accepted {}", args.id);
                Ok(())
            } else {
                Err(OpentellError::Config(format!("no inferred learning {}", args.id)))
            }
        }
        Command::Reject(args) => {
            let store = Store::open(&dir)?;
            if store.reject_observation(&args.id)? {
                eprintln!("opentell: rejected {}", args.id);
                Ok(())
            } else {
                Err(OpentellError::Config(format!("no inferred learning {}", args.id)))
            }
        }
        Command::Export => {
            let store = Store::open(&dir)?;
            println!("{}", store.export()?);
            Ok(())
        }
        Command::Import(args) => {
            let store = Store::open(&dir)?;
            let dump = std::fs::read_to_string(&args.file)?;
            let added = store.import(&dump)?;
            eprintln!("opentell: imported {added} learnings");
            Ok(())
        }
        Command::Reset(args) => {
            if !args.confirm {
                return Err(OpentellError::Config(
                    "refusing to delete state without --confirm".into(),
                ));
            }
            let store = Store::open(&dir)?;
            store.reset()?;
            eprintln!("opentell: state cleared");
            Ok(())
        }
        Command::Update => {
            update::run_check(&dir);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("opentell: {e}");
            ExitCode::from(1)
        }
    }
}
