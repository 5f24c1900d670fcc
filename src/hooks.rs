//! The four hook pipelines. One JSON event comes in on stdin; whatever
//! happens, the process exits 0 — the host assistant must never see a
//! crash, a hang, or unexpected output from its hooks.

use crate::config::{EngineConfig, load_config};
use crate::model::{SessionBuffer, ToolEvent, WalEntry};
use crate::store::Store;
use crate::{OpentellError, analyzer, consolidate, context, log, now_ts, observer, patterns,
    profile, tool_signals, transcript, update, worker};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

const MAX_TOOL_EVENTS: usize = 100;
const MAX_ANALYZED_FINGERPRINTS: usize = 200;
const MAX_COMMAND_CHARS: usize = 300;
const MAX_PAIRS_PER_STOP: usize = 3;
const WAL_DRAIN_CAP: usize = 10;
const WAL_SIDE_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub hook_event_name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stop_hook_active: Option<bool>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cwd: String,
}

/// Entry point for the `hook` subcommand: read one event from stdin,
/// dispatch, swallow everything.
pub fn handle_hook(dir: &Path) {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        log::warn(dir, "hook: unreadable stdin");
        return;
    }
    let payload: HookPayload = match serde_json::from_str(&input) {
        Ok(p) => p,
        Err(e) => {
            log::warn(dir, &format!("hook: bad payload: {e}"));
            return;
        }
    };

    let config = load_config(dir);
    if config.paused {
        return;
    }

    let store = match Store::open(dir) {
        Ok(s) => s,
        Err(e) => {
            log::warn(dir, &format!("hook: state dir: {e}"));
            return;
        }
    };

    let result = match payload.hook_event_name.as_str() {
        "SessionStart" => session_start(&store, &config, &payload),
        "Stop" => turn_stop(&store, &config, &payload),
        "PostToolUse" => tool_use(&store, &payload),
        "SessionEnd" => session_end(&store, &config, &payload),
        other => {
            if !other.is_empty() {
                log::info(dir, &format!("hook: ignoring event {other}"));
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        log::warn(dir, &format!("hook {} failed: {e}", payload.hook_event_name));
    }
}

fn session_start(
    store: &Store,
    config: &EngineConfig,
    payload: &HookPayload,
) -> Result<(), OpentellError> {
    store.save_buffer(&SessionBuffer {
        session_id: payload.session_id.clone(),
        started_at: now_ts(),
        tool_events: Vec::new(),
        last_stop_ts: 0,
        analyzed: Vec::new(),
    })?;

    if let Err(e) = store.apply_decay() {
        log::warn(store.dir(), &format!("decay failed: {e}"));
    }
    store.increment_session_count()?;

    let injection = context::build(store, config.confidence_threshold);
    if !injection.is_empty() {
        print!("{injection}");
    }

    update::maybe_spawn_check(store.dir());
    Ok(())
}

const ERROR_INDICATORS: &[&str] = &[
    "Error:",
    "error[",
    "TypeError",
    "ReferenceError",
    "SyntaxError",
    "ENOENT",
    "EACCES",
    "ECONNREFUSED",
    "command failed",
    "Cannot find module",
    "assertion failed",
    "AssertionError",
    "panicked at",
];

/// ±100 chars of surround for the first error indicator in the assistant
/// text, for the classifier's benefit.
pub fn extract_error_context(text: &str) -> Option<String> {
    let idx = ERROR_INDICATORS
        .iter()
        .filter_map(|ind| text.find(ind))
        .min()?;
    let before = text[..idx].chars().count().saturating_sub(100);
    let surround: String = text.chars().skip(before).take(300).collect();
    Some(surround.trim().to_string())
}

fn turn_stop(
    store: &Store,
    _config: &EngineConfig,
    payload: &HookPayload,
) -> Result<(), OpentellError> {
    let mut buffer = store.load_buffer();
    let session = if payload.session_id.is_empty() {
        None
    } else {
        Some(payload.session_id.as_str())
    };

    let pairs = match payload.transcript_path.as_deref() {
        Some(tp) => transcript::last_pairs(Path::new(tp), MAX_PAIRS_PER_STOP),
        None => Vec::new(),
    };

    for pair in &pairs {
        let fingerprint = crate::text::fingerprint(&pair.assistant, &pair.developer);
        if buffer.analyzed.iter().any(|f| f == &fingerprint) {
            continue;
        }

        // Tool substitutions emitted since the previous stop.
        let now = now_ts();
        for signal in tool_signals::detect(&buffer.tool_events, buffer.last_stop_ts) {
            if let Err(e) = store.add_candidate(&signal, session, None) {
                log::warn(store.dir(), &format!("tool signal store failed: {e}"));
            }
        }
        buffer.last_stop_ts = now;

        let error_context = extract_error_context(&pair.assistant);

        let result = patterns::detect(&pair.assistant, &pair.developer);
        if result.detected {
            for signal in &result.signals {
                if let Err(e) = store.add_candidate(
                    signal,
                    session,
                    Some((&pair.assistant, &pair.developer)),
                ) {
                    log::warn(store.dir(), &format!("signal store failed: {e}"));
                }
            }
        } else if !result.noise {
            // Ambiguous: queue for the detached classifier.
            let tool_context = {
                let formatted = tool_signals::format_tool_context(&buffer.tool_events);
                if formatted.is_empty() { None } else { Some(formatted) }
            };
            let entry = WalEntry {
                claude_said: pair.assistant.chars().take(WAL_SIDE_CHARS).collect(),
                user_said: pair.developer.chars().take(WAL_SIDE_CHARS).collect(),
                error_context,
                tool_context,
                written_at: now,
            };
            if let Err(e) = store.append_wal(&entry) {
                log::warn(store.dir(), &format!("wal append failed: {e}"));
            } else {
                worker::spawn(store.dir());
            }
        }

        // Observer pass: a validated observation beats raw inference.
        if let Some(validated) = observer::detect_validated(&pair.assistant, &pair.developer) {
            if let Err(e) = store.add_candidate(&validated, session, Some((&pair.assistant, &pair.developer))) {
                log::warn(store.dir(), &format!("validated observation failed: {e}"));
            }
        } else {
            for obs in observer::detect_observations(&pair.assistant) {
                if let Err(e) = store.add_observation(&obs, session) {
                    log::warn(store.dir(), &format!("observation store failed: {e}"));
                }
            }
        }

        buffer.analyzed.push(fingerprint);
        while buffer.analyzed.len() > MAX_ANALYZED_FINGERPRINTS {
            buffer.analyzed.remove(0);
        }
    }

    store.save_buffer(&buffer)
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_string())
}

fn tool_use(store: &Store, payload: &HookPayload) -> Result<(), OpentellError> {
    let tool = match payload.tool_name.as_deref() {
        Some(t @ ("Bash" | "Write" | "Edit")) => t,
        _ => return Ok(()),
    };
    let input = payload.tool_input.clone().unwrap_or(serde_json::Value::Null);

    let event = match tool {
        "Bash" => ToolEvent {
            tool: tool.into(),
            ts: now_ts(),
            command: input
                .get("command")
                .and_then(|v| v.as_str())
                .map(|c| c.chars().take(MAX_COMMAND_CHARS).collect()),
            file_path: None,
            ext: None,
        },
        _ => {
            let file_path = input
                .get("file_path")
                .and_then(|v| v.as_str())
                .map(String::from);
            ToolEvent {
                tool: tool.into(),
                ts: now_ts(),
                command: None,
                ext: file_path.as_deref().and_then(extension_of),
                file_path,
            }
        }
    };

    let mut buffer = store.load_buffer();
    if buffer.session_id.is_empty() {
        buffer.session_id = payload.session_id.clone();
    }
    buffer.tool_events.push(event);
    while buffer.tool_events.len() > MAX_TOOL_EVENTS {
        buffer.tool_events.remove(0);
    }
    store.save_buffer(&buffer)
}

fn session_end(
    store: &Store,
    config: &EngineConfig,
    payload: &HookPayload,
) -> Result<(), OpentellError> {
    let buffer = store.load_buffer();

    // Drain what the detached workers didn't get to.
    let entries = store.drain_wal();
    for entry in entries.iter().take(WAL_DRAIN_CAP) {
        match crate::classifier::classify(store.dir(), config, entry) {
            crate::classifier::Verdict::Learning(signal) => {
                let session = if payload.session_id.is_empty() {
                    None
                } else {
                    Some(payload.session_id.as_str())
                };
                if let Err(e) = store.add_candidate(
                    &signal,
                    session,
                    Some((&entry.claude_said, &entry.user_said)),
                ) {
                    log::warn(store.dir(), &format!("drained learning store failed: {e}"));
                }
            }
            crate::classifier::Verdict::NonLearning(_) => {}
            crate::classifier::Verdict::Failed(e) => {
                log::warn(store.dir(), &format!("wal drain classify failed: {e}"));
            }
        }
    }

    // Cross-session intelligence.
    let mut doc = store.load();
    analyzer::analyze(&mut doc, &payload.session_id, buffer.started_at);
    store.save(&doc)?;

    if let Err(e) = store.enforce_cap(config.max_learnings) {
        log::warn(store.dir(), &format!("cap enforcement failed: {e}"));
    }

    let doc = store.load();
    if consolidate::should_consolidate(&doc) {
        match consolidate::consolidate(store, config) {
            Ok(n) if n > 0 => log::info(store.dir(), &format!("consolidated {n} clusters")),
            Ok(_) => {}
            Err(e) => log::warn(store.dir(), &format!("consolidation failed: {e}")),
        }
    }

    if profile::needs_update(store, config.confidence_threshold) {
        match profile::synthesize(store, config) {
            Ok(true) => log::info(store.dir(), "profile regenerated"),
            Ok(false) => {}
            Err(e) => log::warn(store.dir(), &format!("profile synthesis failed: {e}")),
        }
    }

    if let Err(e) = store.apply_passive_accumulation() {
        log::warn(store.dir(), &format!("passive accumulation failed: {e}"));
    }
    if let Err(e) = store.apply_decay() {
        log::warn(store.dir(), &format!("decay failed: {e}"));
    }

    store.clear_wal()?;
    store.clear_buffer()?;
    Ok(())
}
