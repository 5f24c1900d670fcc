//! Preference inference from what the assistant actually ran: when one tool
//! replaces another inside a single turn, the substitution itself is the
//! signal — no words required.

use crate::model::{Classification, DetectionMethod, Scope, Signal, ToolEvent};
use std::collections::HashMap;

const PACKAGE_MANAGERS: &[&str] = &["npm", "pnpm", "yarn", "bun"];
const TEST_RUNNERS: &[&str] = &["jest", "vitest", "mocha", "pytest", "playwright", "cypress"];

const PM_CONFIDENCE: f64 = 0.72;
const RUNNER_CONFIDENCE: f64 = 0.70;
const EXT_CONFIDENCE: f64 = 0.65;

/// Leading token of a command, with `npx` unwrapped.
fn lead_token(command: &str) -> Option<&str> {
    let mut tokens = command.split_whitespace();
    let first = tokens.next()?;
    if first == "npx" { tokens.next() } else { Some(first) }
}

fn package_manager_of(command: &str) -> Option<&'static str> {
    let first = command.split_whitespace().next()?;
    PACKAGE_MANAGERS.iter().find(|pm| **pm == first).copied()
}

fn test_runner_of(command: &str) -> Option<&'static str> {
    let lead = lead_token(command)?;
    if let Some(runner) = TEST_RUNNERS.iter().find(|r| **r == lead) {
        return Some(runner);
    }
    // "cargo test" / "go test" style runners are not substitutions we track;
    // only direct runner invocations count.
    None
}

fn substitution_signal(from: &str, to: &str, confidence: f64, area: &str) -> Signal {
    Signal {
        text: format!("Uses {to} — not {from}"),
        confidence,
        classification: Classification::Preference,
        scope: Scope::Global,
        area: area.to_string(),
        detection_method: DetectionMethod::ToolPattern,
    }
}

/// Detect substitutions among the events of the current turn
/// (`ts > last_stop_ts`). Needs at least two qualifying events to say
/// anything.
pub fn detect(events: &[ToolEvent], last_stop_ts: i64) -> Vec<Signal> {
    let current: Vec<&ToolEvent> = events.iter().filter(|e| e.ts > last_stop_ts).collect();
    let mut signals = Vec::new();

    // Package-manager substitution across consecutive Bash commands.
    let pms: Vec<&str> = current
        .iter()
        .filter(|e| e.tool == "Bash")
        .filter_map(|e| e.command.as_deref())
        .filter_map(package_manager_of)
        .collect();
    for pair in pms.windows(2) {
        if pair[0] != pair[1] {
            signals.push(substitution_signal(pair[0], pair[1], PM_CONFIDENCE, "general"));
        }
    }

    // Test-runner substitution, same shape.
    let runners: Vec<&str> = current
        .iter()
        .filter(|e| e.tool == "Bash")
        .filter_map(|e| e.command.as_deref())
        .filter_map(test_runner_of)
        .collect();
    for pair in runners.windows(2) {
        if pair[0] != pair[1] {
            signals.push(substitution_signal(pair[0], pair[1], RUNNER_CONFIDENCE, "testing"));
        }
    }

    // File-extension substitution: the same base path written with two
    // different extensions means the first choice lost.
    let mut by_base: HashMap<String, Vec<String>> = HashMap::new();
    for e in &current {
        if e.tool != "Write" && e.tool != "Edit" {
            continue;
        }
        if let (Some(path), Some(ext)) = (e.file_path.as_deref(), e.ext.as_deref()) {
            let base = path.strip_suffix(&format!(".{ext}")).unwrap_or(path).to_string();
            let exts = by_base.entry(base).or_default();
            if exts.last().map(String::as_str) != Some(ext) {
                exts.push(ext.to_string());
            }
        }
    }
    for exts in by_base.values() {
        let distinct: std::collections::HashSet<&String> = exts.iter().collect();
        if distinct.len() >= 2 {
            let first = &exts[0];
            let last = exts.last().unwrap();
            if first != last {
                signals.push(Signal {
                    text: format!("Uses {last} files — not {first}"),
                    confidence: EXT_CONFIDENCE,
                    classification: Classification::Preference,
                    scope: Scope::Global,
                    area: "general".to_string(),
                    detection_method: DetectionMethod::ToolPattern,
                });
            }
        }
    }

    // One signal per text is enough per turn.
    signals.dedup_by(|a, b| a.text == b.text);
    signals
}

const CONTEXT_EVENTS: usize = 15;
const CONTEXT_COMMAND_CHARS: usize = 120;

/// Bounded multi-line summary of recent tool activity, appended to the
/// classifier prompt as grounding.
pub fn format_tool_context(events: &[ToolEvent]) -> String {
    let start = events.len().saturating_sub(CONTEXT_EVENTS);
    let mut out = String::new();
    for e in &events[start..] {
        let line = match e.tool.as_str() {
            "Bash" => e
                .command
                .as_deref()
                .map(|c| format!("bash: {}", c.chars().take(CONTEXT_COMMAND_CHARS).collect::<String>())),
            "Write" => e.file_path.as_deref().map(|p| format!("wrote: {p}")),
            "Edit" => e.file_path.as_deref().map(|p| format!("edited: {p}")),
            _ => None,
        };
        if let Some(line) = line {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&line);
        }
    }
    out
}
