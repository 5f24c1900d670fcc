//! Client for the remote classifier. One POST per call, strict-JSON
//! response parsing, and no failure ever propagates past this module's
//! return types: a classifier problem leaves the pair in the WAL for the
//! session-end drain to retry.

use crate::config::EngineConfig;
use crate::model::{Certainty, Classification, DetectionMethod, Scope, Signal, WalEntry};
use crate::prompts;
use crate::{OpentellError, stats};
use std::path::Path;
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CLASSIFY_MAX_TOKENS: u32 = 512;

const PAIR_SIDE_CHARS: usize = 500;
const ERROR_CONTEXT_CHARS: usize = 300;

#[derive(Debug)]
pub enum Verdict {
    /// The pair carried a durable learning.
    Learning(Signal),
    /// Classified, but nothing worth remembering (SITUATIONAL etc.).
    NonLearning(String),
    /// Request or parse failure; the WAL entry should stay queued.
    Failed(String),
}

pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Strip markdown code fences some models wrap around JSON.
fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    if let Some(rest) = t.strip_prefix("```") {
        let rest = rest
            .trim_start_matches(|c: char| c != '\n')
            .trim_start_matches('\n');
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
        return rest.trim();
    }
    t
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Single messages-API request. Shared by the classifier, the consolidator,
/// and the profile synthesizer.
pub fn llm_request(
    api_key: &str,
    model: &str,
    system: &str,
    user: &str,
    max_tokens: u32,
) -> Result<(String, Usage), OpentellError> {
    let body = serde_json::json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": system,
        "messages": [{"role": "user", "content": user}],
    });

    let agent = ureq::Agent::new_with_config(
        ureq::config::Config::builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .build(),
    );

    let resp: serde_json::Value = agent
        .post(API_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", API_VERSION)
        .send_json(&body)
        .map_err(|e| OpentellError::Http(format!("request: {e}")))?
        .body_mut()
        .read_json()
        .map_err(|e| OpentellError::Http(format!("response: {e}")))?;

    let text = resp
        .pointer("/content/0/text")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| OpentellError::Http("no text content in response".into()))?
        .to_string();

    let usage = Usage {
        input_tokens: resp
            .pointer("/usage/input_tokens")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0),
        output_tokens: resp
            .pointer("/usage/output_tokens")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0),
    };

    Ok((text, usage))
}

/// Build the user message for one WAL pair.
fn build_user_message(entry: &WalEntry) -> String {
    let mut out = format!(
        "Assistant said:\n{}\n\nDeveloper replied:\n{}\n",
        truncate_chars(&entry.claude_said, PAIR_SIDE_CHARS),
        truncate_chars(&entry.user_said, PAIR_SIDE_CHARS),
    );
    if let Some(err) = &entry.error_context {
        out.push_str(&format!(
            "\nError context:\n{}\n",
            truncate_chars(err, ERROR_CONTEXT_CHARS)
        ));
    }
    if let Some(tools) = &entry.tool_context {
        out.push_str(&format!("\nRecent tool activity:\n{tools}\n"));
    }
    out
}

/// Interpret the model's JSON reply. Separated from I/O for testing.
pub fn parse_verdict(raw: &str) -> Verdict {
    let parsed: serde_json::Value = match serde_json::from_str(strip_fences(raw)) {
        Ok(v) => v,
        Err(e) => return Verdict::Failed(format!("unparsable classification: {e}")),
    };

    let class_str = parsed
        .get("classification")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let Some(classification) = Classification::parse(class_str) else {
        // SITUATIONAL / FACTUAL / CONTINUATION, or anything unexpected.
        return Verdict::NonLearning(class_str.to_string());
    };

    let learning = parsed
        .get("learning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim();
    if learning.is_empty() {
        return Verdict::NonLearning(class_str.to_string());
    }

    let certainty = Certainty::parse(parsed.get("certainty").and_then(|v| v.as_str()).unwrap_or("low"));
    let scope = Scope::parse(parsed.get("scope").and_then(|v| v.as_str()).unwrap_or("global"));
    let area = parsed
        .get("area")
        .and_then(|v| v.as_str())
        .unwrap_or("general")
        .to_string();

    Verdict::Learning(Signal {
        text: truncate_chars(learning, 200),
        confidence: classification.starting_confidence(certainty),
        classification,
        scope,
        area,
        detection_method: DetectionMethod::Llm,
    })
}

/// Classify one queued pair. Never returns an error; failures come back as
/// `Verdict::Failed` and are the caller's retry problem.
pub fn classify(dir: &Path, config: &EngineConfig, entry: &WalEntry) -> Verdict {
    let Some(api_key) = config.api_key() else {
        return Verdict::Failed("no api key configured".into());
    };

    let user = build_user_message(entry);
    match llm_request(
        &api_key,
        &config.classifier_model,
        prompts::CLASSIFIER_SYSTEM,
        &user,
        CLASSIFY_MAX_TOKENS,
    ) {
        Ok((text, usage)) => {
            stats::record(dir, "classifier", &config.classifier_model, &usage);
            parse_verdict(&text)
        }
        Err(e) => Verdict::Failed(e.to_string()),
    }
}
