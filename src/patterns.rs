//! Deterministic signal extraction from one (assistant, developer) pair.
//! Everything here is table-driven: a noise filter that suppresses
//! non-signal replies, then seven rule families mapping developer phrasing
//! to candidate learnings. No I/O, no allocation beyond the emitted signals.

use crate::model::{Classification, DetectionMethod, Scope, Signal};
use crate::text;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Default)]
pub struct DetectResult {
    pub detected: bool,
    pub signals: Vec<Signal>,
    pub noise: bool,
}

const MAX_DEVELOPER_CHARS: usize = 1500;

// --- Noise filter ---

const AFFIRMATIVES: &str =
    r"(?i)^(ok(ay)?|yes|yep|yeah|sure|thanks?|thank you|great|cool|nice|perfect|awesome|sounds good|lgtm|go ahead|do it|yes exactly|exactly)[.! ]*$";
const OPENERS: &str = r"(?i)^(now|also|next|and also|then|after that)\b";
const QUESTION_START: &str =
    r"(?i)^(what|why|how|when|where|which|who|is|are|can|could|would|will|does|do|should)\b";
const QUESTION_ESCAPES: &str = r"(?i)^(what happens|what about|what if)\b";
const BUG_REPORTS: &str =
    r"(?i)(that'?s wrong|there'?s a bug|it'?s broken|doesn'?t work|not working|still (failing|broken|fails)|found a bug)";

fn noise_regexes() -> &'static [Regex; 5] {
    static RES: OnceLock<[Regex; 5]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(AFFIRMATIVES).unwrap(),
            Regex::new(OPENERS).unwrap(),
            Regex::new(QUESTION_START).unwrap(),
            Regex::new(QUESTION_ESCAPES).unwrap(),
            Regex::new(BUG_REPORTS).unwrap(),
        ]
    })
}

/// A developer message that carries no preference signal.
pub fn is_noise(developer: &str) -> bool {
    let trimmed = developer.trim();
    if trimmed.chars().count() > MAX_DEVELOPER_CHARS {
        return true;
    }
    let [affirm, opener, question, escape, bug] = noise_regexes();
    if trimmed.chars().count() <= 15 && affirm.is_match(trimmed) {
        return true;
    }
    if opener.is_match(trimmed) {
        return true;
    }
    if question.is_match(trimmed) {
        let lower = trimmed.to_lowercase();
        let escaped =
            lower.contains("instead") || lower.contains("rather") || escape.is_match(trimmed);
        if !escaped {
            return true;
        }
    }
    bug.is_match(trimmed)
}

// --- Rule families ---

enum Extract {
    Fixed(&'static str),
    /// `{1}` / `{2}` replaced with trimmed capture groups.
    Template(&'static str),
}

struct Rule {
    pattern: &'static str,
    extract: Extract,
    classification: Classification,
    scope: Scope,
    area: &'static str,
    confidence: f64,
}

const fn pref(pattern: &'static str, extract: Extract) -> Rule {
    Rule {
        pattern,
        extract,
        classification: Classification::Preference,
        scope: Scope::Global,
        area: "general",
        confidence: 0.35,
    }
}

static RULES: &[Rule] = &[
    // Corrections — the strongest deterministic signal.
    pref(r"(?i)\bno,?\s+use\s+([\w@./+-]+)", Extract::Template("Prefers {1}")),
    pref(
        r"(?i)\bactually,?\s+(?:use|go with)\s+([\w@./+-]+)",
        Extract::Template("Prefers {1}"),
    ),
    pref(
        r"(?i)\buse\s+([\w@./+-]+)\s+instead\s+of\s+([\w@./+-]+)",
        Extract::Template("Prefers {1} instead of {2}"),
    ),
    pref(
        r"(?i)\buse\s+([\w@./+-]+)\s+instead\b",
        Extract::Template("Prefers {1}"),
    ),
    pref(
        r"(?i)^(?:use\s+)?([\w@./+-]+),?\s+not\s+([\w@./+-]+)[.!]?$",
        Extract::Template("Prefers {1} — not {2}"),
    ),
    pref(r"(?i)\bdon'?t\s+use\s+([\w@./+-]+)", Extract::Template("Avoids {1}")),
    pref(
        r"(?i)\bchange\s+(?:it|this|that)\s+to\s+([\w@./+-]+)",
        Extract::Template("Prefers {1}"),
    ),
    pref(
        r"(?i)\b(?:it|this|that)\s+should\s+be\s+([\w@./+-]+)",
        Extract::Template("Prefers {1}"),
    ),
    // Conventions — team and project habits.
    Rule {
        pattern: r"(?i)\b(?:we|our team)\s+(?:always\s+)?uses?\s+([^.!?\n]{2,60})",
        extract: Extract::Template("Uses {1}"),
        classification: Classification::Preference,
        scope: Scope::Repo,
        area: "general",
        confidence: 0.35,
    },
    pref(
        r"(?i)\bI\s+always\s+([^.!?\n]{2,60})",
        Extract::Template("Always {1}"),
    ),
    pref(
        r"(?i)\bI\s+usually\s+([^.!?\n]{2,60})",
        Extract::Template("Usually {1}"),
    ),
    Rule {
        pattern: r"(?i)\bin\s+this\s+(?:project|repo|codebase),?\s+(?:we\s+)?([^.!?\n]{2,60})",
        extract: Extract::Template("In this project: {1}"),
        classification: Classification::Preference,
        scope: Scope::Repo,
        area: "general",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\bput\s+([^.!?\n]{2,40}?)\s+in\s+([^.!?\n]{2,40})",
        extract: Extract::Template("Puts {1} in {2}"),
        classification: Classification::Preference,
        scope: Scope::Repo,
        area: "architecture",
        confidence: 0.35,
    },
    pref(
        r"(?i)\bfollow\s+(?:the\s+)?([^.!?\n]{2,40}?)\s+convention",
        Extract::Template("Follows the {1} convention"),
    ),
    // Style — how answers and code should read.
    pref(
        r"(?i)\b(?:be\s+(?:more\s+)?concise|too\s+verbose|keep\s+it\s+(?:short|brief)|shorter\s+(?:answers|responses))\b",
        Extract::Fixed("Prefers concise responses"),
    ),
    pref(
        r"(?i)\b(?:just\s+(?:show|give)\s+(?:me\s+)?(?:the\s+)?code|skip\s+the\s+explanation|code\s+first)\b",
        Extract::Fixed("Prefers code-first responses"),
    ),
    pref(
        r"(?i)\b(?:explain\s+(?:more|that|why)|more\s+detail|walk\s+me\s+through)\b",
        Extract::Fixed("Prefers more explanation"),
    ),
    pref(
        r"(?i)\b(?:remove\s+(?:the\s+)?comments|too\s+many\s+comments|fewer\s+comments|no\s+comments)\b",
        Extract::Fixed("Prefers minimal comments"),
    ),
    pref(
        r"(?i)\b(?:add\s+(?:more\s+)?comments|comment\s+(?:this|the)\s+code)\b",
        Extract::Fixed("Prefers more comments"),
    ),
    pref(
        r"(?i)\b(?:strict\s+typ(?:es|ing)|no\s+any\b|add\s+types|type\s+annotations)\b",
        Extract::Fixed("Prefers strict typing"),
    ),
    // Thinking patterns — 0.38, the deepest deterministic family.
    Rule {
        pattern: r"(?i)\b(?:keep\s+it\s+simple|simpler|over-?complicat|over-?engineer|don'?t\s+overthink)",
        extract: Extract::Fixed("Keeps solutions simple"),
        classification: Classification::ThinkingPattern,
        scope: Scope::Global,
        area: "general",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)\b(?:at\s+scale|think\s+about\s+scale|scalab)",
        extract: Extract::Fixed("Thinks about scale early"),
        classification: Classification::ThinkingPattern,
        scope: Scope::Global,
        area: "architecture",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)\b(?:prototype\s+first|quick\s+prototype|proof\s+of\s+concept|get\s+it\s+working\s+first)",
        extract: Extract::Fixed("Prototypes before polishing"),
        classification: Classification::ThinkingPattern,
        scope: Scope::Global,
        area: "general",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)\b(?:data\s+model\s+first|start\s+with\s+the\s+data|schema\s+first)",
        extract: Extract::Fixed("Starts from the data model"),
        classification: Classification::ThinkingPattern,
        scope: Scope::Global,
        area: "data",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)\b(?:user'?s?\s+perspective|from\s+the\s+user|what\s+the\s+user\s+sees)",
        extract: Extract::Fixed("Thinks from the user's perspective"),
        classification: Classification::ThinkingPattern,
        scope: Scope::Global,
        area: "ux",
        confidence: 0.38,
    },
    // Design principles.
    Rule {
        pattern: r"(?i)\b(?:separat(?:e|ion)\s+(?:of\s+)?concerns|keep\s+\w+\s+and\s+\w+\s+separate)",
        extract: Extract::Fixed("Separates concerns"),
        classification: Classification::DesignPrinciple,
        scope: Scope::Global,
        area: "architecture",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)\b(?:single\s+responsibility|does\s+too\s+(?:much|many\s+things)|one\s+thing\s+well)",
        extract: Extract::Fixed("Single responsibility per unit"),
        classification: Classification::DesignPrinciple,
        scope: Scope::Global,
        area: "architecture",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)\b(?:don'?t\s+hardcode|no\s+hardcod|avoid\s+hardcod|make\s+it\s+configurable)",
        extract: Extract::Fixed("Avoids hardcoded values"),
        classification: Classification::DesignPrinciple,
        scope: Scope::Global,
        area: "architecture",
        confidence: 0.38,
    },
    Rule {
        pattern: r"(?i)(?:\bdry\b|don'?t\s+repeat\s+yourself|duplicat(?:e|ed|ion)\s+(?:code|logic)|extract\s+(?:this|that|it)\s+into)",
        extract: Extract::Fixed("Avoids duplicated logic"),
        classification: Classification::DesignPrinciple,
        scope: Scope::Global,
        area: "architecture",
        confidence: 0.38,
    },
    // Quality standards.
    Rule {
        pattern: r"(?i)\b(?:handle\s+(?:the\s+)?errors?|error\s+handling|catch\s+(?:the\s+)?exception)",
        extract: Extract::Fixed("Expects error handling"),
        classification: Classification::QualityStandard,
        scope: Scope::Global,
        area: "general",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\b(?:add|write|needs?|missing)\s+(?:a\s+|some\s+)?tests?\b|test\s+coverage",
        extract: Extract::Fixed("Expects tests"),
        classification: Classification::QualityStandard,
        scope: Scope::Global,
        area: "testing",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)(?:accessib|\ba11y\b|aria-|screen\s+reader)",
        extract: Extract::Fixed("Expects accessibility"),
        classification: Classification::QualityStandard,
        scope: Scope::Global,
        area: "ux",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\b(?:add\s+logg?ing|log\s+(?:this|that|errors|failures))\b",
        extract: Extract::Fixed("Expects logging"),
        classification: Classification::QualityStandard,
        scope: Scope::Global,
        area: "backend",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)(?:\bvalidate\s+(?:the\s+)?input|input\s+validation|sanitiz)",
        extract: Extract::Fixed("Expects input validation"),
        classification: Classification::QualityStandard,
        scope: Scope::Global,
        area: "backend",
        confidence: 0.35,
    },
    // Named tools — the canonical name is what gets remembered.
    Rule {
        pattern: r"(?i)\b(?:use|uses|using|with|switch(?:ed|ing)?\s+to|let'?s\s+use|we\s+use|prefer)\s+(npm|pnpm|yarn|bun|cargo|pip|poetry|uv)\b",
        extract: Extract::Template("Uses {1}"),
        classification: Classification::Preference,
        scope: Scope::Global,
        area: "general",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\b(?:use|uses|using|with|switch(?:ed|ing)?\s+to|let'?s\s+use|we\s+use|prefer)\s+(jest|vitest|mocha|pytest|playwright|cypress)\b",
        extract: Extract::Template("Uses {1}"),
        classification: Classification::Preference,
        scope: Scope::Global,
        area: "testing",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\b(?:use|uses|using|with|switch(?:ed|ing)?\s+to|let'?s\s+use|we\s+use|prefer)\s+(eslint|prettier|biome|ruff|clippy|rustfmt|black)\b",
        extract: Extract::Template("Uses {1}"),
        classification: Classification::Preference,
        scope: Scope::Global,
        area: "general",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\b(?:use|uses|using|with|switch(?:ed|ing)?\s+to|let'?s\s+use|we\s+use|prefer)\s+(react|vue|svelte|angular|next|nuxt|express|fastify|django|flask|axum|actix)\b",
        extract: Extract::Template("Uses {1}"),
        classification: Classification::Preference,
        scope: Scope::Global,
        area: "general",
        confidence: 0.35,
    },
    Rule {
        pattern: r"(?i)\b(?:use|uses|using|with|switch(?:ed|ing)?\s+to|let'?s\s+use|we\s+use|prefer|on)\s+(postgres|postgresql|mysql|sqlite|mongodb|redis)\b",
        extract: Extract::Template("Uses {1}"),
        classification: Classification::Preference,
        scope: Scope::Global,
        area: "data",
        confidence: 0.35,
    },
];

fn compiled_rules() -> &'static Vec<(Regex, &'static Rule)> {
    static COMPILED: OnceLock<Vec<(Regex, &'static Rule)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|r| (Regex::new(r.pattern).unwrap(), r))
            .collect()
    })
}

fn clean_capture(s: &str) -> String {
    s.trim().trim_end_matches(['.', ',', '!', '?', ';', ':']).trim().to_string()
}

fn render(extract: &Extract, caps: &regex::Captures) -> Option<String> {
    match extract {
        Extract::Fixed(text) => Some((*text).to_string()),
        Extract::Template(template) => {
            let mut out = (*template).to_string();
            for i in 1..caps.len() {
                let placeholder = format!("{{{i}}}");
                if out.contains(&placeholder) {
                    let value = clean_capture(caps.get(i)?.as_str());
                    if value.is_empty() {
                        return None;
                    }
                    out = out.replace(&placeholder, &value.to_lowercase());
                }
            }
            Some(out)
        }
    }
}

/// Collapse multiple signals from one pair: one representative per
/// normalized core, highest confidence then longest text wins.
fn dedup(mut signals: Vec<Signal>) -> Vec<Signal> {
    let mut kept: Vec<Signal> = Vec::new();
    signals.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.text.len().cmp(&a.text.len()))
    });
    for s in signals {
        let core = text::core_of(&s.text);
        if !kept.iter().any(|k| text::core_of(&k.text) == core) {
            kept.push(s);
        }
    }
    kept
}

/// Run the full detector over one pair. `noise` is true only when the noise
/// filter fired; a quiet non-noise pair is the classifier's business.
pub fn detect(_assistant: &str, developer: &str) -> DetectResult {
    if is_noise(developer) {
        return DetectResult {
            detected: false,
            signals: Vec::new(),
            noise: true,
        };
    }

    let mut signals = Vec::new();
    for (regex, rule) in compiled_rules() {
        if let Some(caps) = regex.captures(developer)
            && let Some(rendered) = render(&rule.extract, &caps)
        {
            signals.push(Signal {
                text: rendered,
                confidence: rule.confidence,
                classification: rule.classification,
                scope: rule.scope,
                area: rule.area.to_string(),
                detection_method: DetectionMethod::Regex,
            });
        }
    }

    let signals = dedup(signals);
    DetectResult {
        detected: !signals.is_empty(),
        signals,
        noise: false,
    }
}
