//! Read-only view of the host's transcript: a JSONL file of records with a
//! role and either a string body or a list of content blocks. Only text
//! blocks count; tool calls and tool results are invisible here.

use std::io::BufRead;
use std::path::Path;

/// One assistant utterance immediately followed by one developer reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub assistant: String,
    pub developer: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Assistant,
    Developer,
}

/// Pull the text out of one transcript record, or None when the record is
/// malformed, tool-only, or trivially short.
fn record_text(entry: &serde_json::Value) -> Option<(Role, String)> {
    let role = match entry.get("type").and_then(|v| v.as_str()) {
        Some("assistant") => Role::Assistant,
        Some("user") | Some("human") => Role::Developer,
        _ => return None,
    };

    let content = entry.get("message").and_then(|m| m.get("content"))?;

    let mut out = String::new();
    match content {
        serde_json::Value::String(s) => out.push_str(s),
        serde_json::Value::Array(blocks) => {
            for block in blocks {
                if block.get("type").and_then(|v| v.as_str()) == Some("text")
                    && let Some(t) = block.get("text").and_then(|v| v.as_str())
                {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(t);
                }
            }
        }
        _ => return None,
    }

    let out = out.trim().to_string();
    if out.chars().count() <= 3 {
        return None;
    }
    Some((role, out))
}

/// All (assistant, developer) pairs in transcript order. Missing files and
/// malformed lines yield nothing; the reader never fails the caller.
pub fn read_pairs(path: &Path) -> Vec<Pair> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };
    let reader = std::io::BufReader::new(file);

    let mut pairs = Vec::new();
    let mut pending_assistant: Option<String> = None;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => continue,
        };
        match record_text(&entry) {
            Some((Role::Assistant, text)) => pending_assistant = Some(text),
            Some((Role::Developer, text)) => {
                if let Some(assistant) = pending_assistant.take() {
                    pairs.push(Pair {
                        assistant,
                        developer: text,
                    });
                }
            }
            // Tool-only records do not break an assistant→developer adjacency
            // at the text level, but unreadable records reset nothing either.
            None => {}
        }
    }

    pairs
}

/// The most recent `n` pairs, oldest first.
pub fn last_pairs(path: &Path, n: usize) -> Vec<Pair> {
    let mut pairs = read_pairs(path);
    if pairs.len() > n {
        pairs.drain(..pairs.len() - n);
    }
    pairs
}
