//! Local accounting of LLM usage: calls, tokens, and an estimated cost,
//! bucketed by month and call type in `stats.json`. Purely informational;
//! a corrupt file is reinitialized rather than repaired.

use crate::classifier::Usage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const STATS_FILE: &str = "stats.json";

// Approximate $ per million tokens (input, output) by model family.
const PRICES: &[(&str, f64, f64)] = &[
    ("haiku", 0.80, 4.00),
    ("sonnet", 3.00, 15.00),
    ("opus", 15.00, 75.00),
];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CallStats {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    /// month ("YYYY-MM") → call type → totals
    #[serde(default)]
    pub months: BTreeMap<String, BTreeMap<String, CallStats>>,
}

fn estimate_cost(model: &str, usage: &Usage) -> f64 {
    let (input_rate, output_rate) = PRICES
        .iter()
        .find(|(family, _, _)| model.contains(family))
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or((3.00, 15.00));
    (usage.input_tokens as f64 * input_rate + usage.output_tokens as f64 * output_rate) / 1e6
}

fn month_key(ts: i64) -> String {
    // Year/month from the civil-date algorithm in the log module's formatter.
    let days = ts.div_euclid(86400);
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}")
}

pub fn load(dir: &Path) -> Stats {
    std::fs::read_to_string(dir.join(STATS_FILE))
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// Fold one LLM call into the aggregates. Failures are swallowed — stats
/// must never break a background path.
pub fn record(dir: &Path, call_type: &str, model: &str, usage: &Usage) {
    let mut stats = load(dir);
    let entry = stats
        .months
        .entry(month_key(crate::now_ts()))
        .or_default()
        .entry(call_type.to_string())
        .or_default();
    entry.calls += 1;
    entry.input_tokens += usage.input_tokens;
    entry.output_tokens += usage.output_tokens;
    entry.cost_usd += estimate_cost(model, usage);

    if let Ok(bytes) = serde_json::to_vec_pretty(&stats) {
        let _ = std::fs::write(dir.join(STATS_FILE), bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let dir = tempfile::TempDir::new().unwrap();
        let usage = Usage {
            input_tokens: 1000,
            output_tokens: 200,
        };
        record(dir.path(), "classifier", "claude-3-5-haiku-latest", &usage);
        record(dir.path(), "classifier", "claude-3-5-haiku-latest", &usage);
        record(dir.path(), "profile", "claude-sonnet-4-20250514", &usage);

        let stats = load(dir.path());
        assert_eq!(stats.months.len(), 1);
        let month = stats.months.values().next().unwrap();
        assert_eq!(month["classifier"].calls, 2);
        assert_eq!(month["classifier"].input_tokens, 2000);
        assert_eq!(month["profile"].calls, 1);
        assert!(month["classifier"].cost_usd > 0.0);
        // Sonnet output is pricier than haiku output.
        assert!(month["profile"].cost_usd > month["classifier"].cost_usd / 2.0);
    }

    #[test]
    fn corrupt_stats_reinitialized() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(STATS_FILE), "][").unwrap();
        let usage = Usage {
            input_tokens: 10,
            output_tokens: 10,
        };
        record(dir.path(), "classifier", "claude-3-5-haiku-latest", &usage);
        let stats = load(dir.path());
        assert_eq!(stats.months.len(), 1);
    }

    #[test]
    fn month_key_shape() {
        assert_eq!(month_key(0), "1970-01");
        assert_eq!(month_key(1785628800), "2026-08");
    }
}
