//! The assistant narrates its own adaptations ("I'll use pnpm since that's
//! what the project uses"). Those statements become *inferred* learnings —
//! low-confidence rows waiting for the developer to confirm or contradict
//! them. A short affirmative reply right after such a statement upgrades it
//! on the spot.

use crate::model::{Classification, DetectionMethod, Scope, Signal};
use crate::text;
use regex::Regex;
use std::sync::OnceLock;

const SCAN_CHARS: usize = 1000;
// Bounds on the rendered learning text ("Uses <extraction>").
const MIN_TEXT: usize = 5;
const MAX_TEXT: usize = 150;
const VALIDATED_CONFIDENCE: f64 = 0.45;
const MAX_REPLY_CHARS: usize = 80;

struct ObsRule {
    kind: &'static str,
    pattern: &'static str,
    confidence: f64,
}

static OBS_RULES: &[ObsRule] = &[
    ObsRule {
        kind: "self_adaptation",
        pattern: r"(?i)\bI'?ll\s+use\s+(.{2,100}?)\s+(?:since|because)\s+(?:that'?s\s+what\s+)?(?:the\s+)?(?:project|team|codebase)\s+(?:already\s+)?uses\b",
        confidence: 0.25,
    },
    ObsRule {
        kind: "since_project_uses",
        pattern: r"(?i)\busing\s+(.{2,100}?)\s+since\s+the\s+project\s+already\s+uses\b",
        confidence: 0.22,
    },
    ObsRule {
        kind: "project_observation",
        pattern: r"(?i)\bI\s+(?:notice|see|observe)\s+(?:that\s+)?(?:the|this)\s+(?:project|codebase|repo)\s+uses\s+([^.!?\n]{2,120})",
        confidence: 0.20,
    },
    ObsRule {
        kind: "follow_same",
        pattern: r"(?i)\bfollow(?:ing)?\s+the\s+same\s+([^.!?\n]{2,120}?)\s+as\b",
        confidence: 0.18,
    },
    ObsRule {
        kind: "matching_existing",
        pattern: r"(?i)\bmatch(?:ing)?\s+the\s+existing\s+([^.!?\n]{2,120})",
        confidence: 0.16,
    },
    ObsRule {
        kind: "based_on_existing",
        pattern: r"(?i)\bbased\s+on\s+the\s+existing\s+([^.!?\n]{2,120})",
        confidence: 0.15,
    },
];

// Extractions too generic to be worth remembering.
const GENERIC_PHRASES: &[&str] = &[
    "it", "this", "that", "them", "code", "style", "approach", "pattern", "patterns",
    "structure", "convention", "conventions", "setup", "way", "same approach", "same pattern",
    "same style", "existing code", "existing style", "one",
];

const TOOL_VOCAB: &[&str] = &[
    "npm", "pnpm", "yarn", "bun", "jest", "vitest", "mocha", "pytest", "playwright", "cypress",
    "eslint", "prettier", "biome", "react", "vue", "svelte", "angular", "next", "express",
    "fastify", "postgres", "mysql", "sqlite", "mongodb", "redis", "prisma", "drizzle",
    "tailwind", "typescript", "docker",
];
const ARCH_VOCAB: &[&str] = &[
    "architecture", "layer", "layers", "module", "modules", "service", "services",
    "component", "components", "separation", "boundaries", "folder", "directory",
];
const QUALITY_VOCAB: &[&str] = &[
    "test", "tests", "testing", "error", "errors", "validation", "logging", "types", "lint",
];

fn compiled_obs_rules() -> &'static Vec<(Regex, &'static ObsRule)> {
    static COMPILED: OnceLock<Vec<(Regex, &'static ObsRule)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        OBS_RULES
            .iter()
            .map(|r| (Regex::new(r.pattern).unwrap(), r))
            .collect()
    })
}

fn affirmation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(yes|yeah|yep|exactly|correct|right|that'?s right|good catch|precisely|spot on|perfect)\b",
        )
        .unwrap()
    })
}

fn rejection() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(no|nope|not quite|actually|instead|rather than)\b").unwrap()
    })
}

fn classify_extraction(extracted: &str, kind: &str) -> Classification {
    let normalized = text::normalize(extracted);
    let has = |vocab: &[&str]| normalized.split_whitespace().any(|w| vocab.contains(&w));
    if has(TOOL_VOCAB) {
        return Classification::Preference;
    }
    if has(ARCH_VOCAB) {
        return Classification::DesignPrinciple;
    }
    if has(QUALITY_VOCAB) {
        return Classification::QualityStandard;
    }
    match kind {
        "follow_same" | "matching_existing" | "based_on_existing" => Classification::DesignPrinciple,
        _ => Classification::Preference,
    }
}

fn area_of(extracted: &str) -> &'static str {
    let normalized = text::normalize(extracted);
    let has = |words: &[&str]| normalized.split_whitespace().any(|w| words.contains(&w));
    if has(&["react", "vue", "svelte", "angular", "css", "tailwind", "component", "components", "ui"]) {
        "frontend"
    } else if has(&["jest", "vitest", "pytest", "playwright", "cypress", "test", "tests", "testing"]) {
        "testing"
    } else if has(&["postgres", "mysql", "sqlite", "mongodb", "redis", "schema", "database", "migration"]) {
        "data"
    } else if has(&["docker", "ci", "deploy", "kubernetes"]) {
        "devops"
    } else if has(&["api", "server", "endpoint", "express", "fastify", "backend"]) {
        "backend"
    } else if has(ARCH_VOCAB) {
        "architecture"
    } else {
        "general"
    }
}

fn clean_extraction(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim();
    let count = cleaned.chars().count() + "Uses ".len();
    if !(MIN_TEXT..=MAX_TEXT).contains(&count) {
        return None;
    }
    let normalized = text::normalize(cleaned);
    if GENERIC_PHRASES.contains(&normalized.as_str()) {
        return None;
    }
    Some(cleaned.to_string())
}

/// Extract self-adaptation statements from the assistant's side of a pair,
/// highest confidence first.
pub fn detect_observations(assistant: &str) -> Vec<Signal> {
    let scan: String = assistant.chars().take(SCAN_CHARS).collect();
    let mut signals = Vec::new();

    for (regex, rule) in compiled_obs_rules() {
        if let Some(caps) = regex.captures(&scan)
            && let Some(m) = caps.get(1)
            && let Some(extracted) = clean_extraction(m.as_str())
        {
            let classification = classify_extraction(&extracted, rule.kind);
            let area = area_of(&extracted);
            signals.push(Signal {
                text: format!("Uses {extracted}"),
                confidence: rule.confidence,
                classification,
                scope: Scope::Global,
                area: area.to_string(),
                detection_method: DetectionMethod::ClaudeObservation,
            });
        }
    }

    signals.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    signals
}

/// A short affirmative reply immediately after a self-adaptation statement
/// validates the observation at activation confidence.
pub fn detect_validated(assistant: &str, developer: &str) -> Option<Signal> {
    let reply = developer.trim();
    if reply.chars().count() > MAX_REPLY_CHARS {
        return None;
    }
    if rejection().is_match(reply) {
        return None;
    }
    if !affirmation().is_match(reply) {
        return None;
    }
    let mut observations = detect_observations(assistant);
    if observations.is_empty() {
        return None;
    }
    let mut top = observations.remove(0);
    top.confidence = VALIDATED_CONFIDENCE;
    top.detection_method = DetectionMethod::ValidatedObservation;
    Some(top)
}
