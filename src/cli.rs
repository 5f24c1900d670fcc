use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opentell", version, about = "Learns how you work from Claude Code sessions")]
pub struct Cli {
    /// State directory (default ~/.opentell)
    #[arg(long, env = "OPENTELL_DIR", global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Handle one hook event from stdin (SessionStart, Stop, PostToolUse, SessionEnd)
    Hook,
    /// Background classifier worker (spawned by the Stop hook)
    #[command(hide = true)]
    ClassifyWorker,
    /// Show what would be injected at session start
    Context,
    /// State health: learning counts, sessions, WAL depth
    Status,
    /// List learnings
    Learnings(LearningsArgs),
    /// Write promotable learnings into the project instruction file
    Promote(PromoteArgs),
    /// Accept an inferred observation as a real candidate
    Accept(IdArgs),
    /// Reject an inferred observation
    Reject(IdArgs),
    /// Dump the learning document as JSON to stdout
    Export,
    /// Merge a previously exported document back in
    Import(ImportArgs),
    /// Delete all learned state
    Reset(ResetArgs),
    /// Check for a newer release
    Update,
}

#[derive(Parser)]
pub struct LearningsArgs {
    /// Include archived and promoted learnings
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser)]
pub struct PromoteArgs {
    /// Target instruction file (default ./CLAUDE.md)
    #[arg(long, short)]
    pub file: Option<PathBuf>,
}

#[derive(Parser)]
pub struct IdArgs {
    /// Learning id (e.g. lrn-0a1b2c3d4e5f)
    pub id: String,
}

#[derive(Parser)]
pub struct ImportArgs {
    /// Exported JSON file
    pub file: PathBuf,
}

#[derive(Parser)]
pub struct ResetArgs {
    /// Actually delete — required
    #[arg(long)]
    pub confirm: bool,
}
