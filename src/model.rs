use serde::{Deserialize, Serialize};

/// Confidence at which a learning becomes eligible for injection.
pub const ACTIVATION: f64 = 0.45;
/// Confidence floor for promotion into the host instruction file.
pub const PROMOTION: f64 = 0.80;
/// Evidence floor for promotion.
pub const PROMOTION_MIN_EVIDENCE: u32 = 4;
/// Below this, decayed learnings are archived.
pub const ARCHIVE: f64 = 0.15;
/// Hard ceiling for inferred (assistant-observed, unvalidated) learnings.
/// Strictly below ACTIVATION so an inferred learning can never inject itself.
pub const INFERRED_CAP: f64 = 0.44;
/// Evidence ring length per learning.
pub const MAX_EVIDENCE: usize = 10;
/// Per-side evidence truncation, in characters.
pub const EVIDENCE_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "THINKING_PATTERN")]
    ThinkingPattern,
    #[serde(rename = "DESIGN_PRINCIPLE")]
    DesignPrinciple,
    #[serde(rename = "QUALITY_STANDARD")]
    QualityStandard,
    #[serde(rename = "PREFERENCE")]
    Preference,
    #[serde(rename = "BEHAVIORAL_GAP")]
    BehavioralGap,
}

impl Classification {
    /// Depth ordering: deeper classifications win on merge.
    pub fn depth(self) -> u8 {
        match self {
            Classification::ThinkingPattern => 5,
            Classification::DesignPrinciple => 4,
            Classification::QualityStandard => 3,
            Classification::BehavioralGap => 2,
            Classification::Preference => 1,
        }
    }

    /// Starting confidence by (classification, certainty).
    pub fn starting_confidence(self, certainty: Certainty) -> f64 {
        match (self, certainty) {
            (Classification::ThinkingPattern | Classification::DesignPrinciple, Certainty::High) => 0.38,
            (Classification::ThinkingPattern | Classification::DesignPrinciple, Certainty::Low) => 0.28,
            (Classification::QualityStandard | Classification::Preference, Certainty::High) => 0.35,
            (Classification::QualityStandard | Classification::Preference, Certainty::Low) => 0.25,
            (Classification::BehavioralGap, Certainty::High) => 0.30,
            (Classification::BehavioralGap, Certainty::Low) => 0.20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::ThinkingPattern => "THINKING_PATTERN",
            Classification::DesignPrinciple => "DESIGN_PRINCIPLE",
            Classification::QualityStandard => "QUALITY_STANDARD",
            Classification::Preference => "PREFERENCE",
            Classification::BehavioralGap => "BEHAVIORAL_GAP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "THINKING_PATTERN" => Some(Classification::ThinkingPattern),
            "DESIGN_PRINCIPLE" => Some(Classification::DesignPrinciple),
            "QUALITY_STANDARD" => Some(Classification::QualityStandard),
            "PREFERENCE" => Some(Classification::Preference),
            "BEHAVIORAL_GAP" => Some(Classification::BehavioralGap),
            _ => None,
        }
    }

    /// All classifications in depth order, deepest first.
    pub fn depth_order() -> [Classification; 5] {
        [
            Classification::ThinkingPattern,
            Classification::DesignPrinciple,
            Classification::QualityStandard,
            Classification::BehavioralGap,
            Classification::Preference,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Certainty {
    High,
    Low,
}

impl Certainty {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("high") {
            Certainty::High
        } else {
            Certainty::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Global,
    Repo,
    Language,
}

impl Scope {
    pub fn parse(s: &str) -> Self {
        match s {
            "repo" => Scope::Repo,
            "language" => Scope::Language,
            _ => Scope::Global,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Regex,
    ToolPattern,
    Llm,
    ClaudeObservation,
    ValidatedObservation,
    Consolidation,
    ClaudeObservationAccepted,
    ClaudeObservationValidated,
}

/// A candidate learning emitted by one of the detectors.
#[derive(Debug, Clone)]
pub struct Signal {
    pub text: String,
    pub confidence: f64,
    pub classification: Classification,
    pub scope: Scope,
    pub area: String,
    pub detection_method: DetectionMethod,
}

/// One truncated conversational exchange kept as supporting evidence.
/// Never holds raw code or full messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub claude_said: String,
    pub user_said: String,
    pub ts: i64,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn one() -> f64 {
    1.0
}

/// The atomic unit of memory. Optional bookkeeping keys accumulate over a
/// learning's lifetime and are omitted from the document until set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub id: String,
    pub text: String,
    pub classification: Classification,
    pub confidence: f64,
    pub evidence_count: u32,
    #[serde(default)]
    pub scope: Scope,
    pub area: String,
    #[serde(default)]
    pub areas: Vec<String>,
    pub detection_method: DetectionMethod,
    pub first_seen: i64,
    pub last_reinforced: i64,
    #[serde(default = "one")]
    pub decay_weight: f64,
    #[serde(default)]
    pub session_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub inferred: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub promoted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub observation_corroborations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_from_group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consolidated_from_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_into: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cross_session_boosted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_session_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_upgraded_from: Option<Classification>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deep_pattern_upgrade: bool,
}

impl Learning {
    /// Terminal learnings are never injected and never reinforced.
    pub fn terminal(&self) -> bool {
        self.archived || self.promoted
    }

    /// Active means injectable: non-terminal, validated, above threshold.
    pub fn active(&self, threshold: f64) -> bool {
        !self.terminal() && !self.inferred && self.confidence >= threshold
    }

    pub fn promotable(&self) -> bool {
        !self.terminal()
            && !self.inferred
            && self.confidence >= PROMOTION
            && self.evidence_count >= PROMOTION_MIN_EVIDENCE
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_consolidation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidation_session: Option<u32>,
    /// Second-resolution guard making a repeated decay run a no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decay: Option<i64>,
}

/// The single persisted learning document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningsDoc {
    #[serde(default)]
    pub learnings: Vec<Learning>,
    #[serde(default)]
    pub meta: Meta,
}

/// One ambiguous pair queued for asynchronous classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub claude_said: String,
    pub user_said: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_context: Option<String>,
    pub written_at: i64,
}

/// Compact projection of one tool invocation, kept in the session buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub tool: String,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
}

/// Ephemeral per-session scratch state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionBuffer {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub started_at: i64,
    #[serde(default)]
    pub tool_events: Vec<ToolEvent>,
    #[serde(default)]
    pub last_stop_ts: i64,
    #[serde(default)]
    pub analyzed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub text: String,
    pub generated_at: i64,
    pub learning_count: usize,
    pub session_count: u32,
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_order_matches_spec() {
        assert_eq!(Classification::ThinkingPattern.depth(), 5);
        assert_eq!(Classification::DesignPrinciple.depth(), 4);
        assert_eq!(Classification::QualityStandard.depth(), 3);
        assert_eq!(Classification::BehavioralGap.depth(), 2);
        assert_eq!(Classification::Preference.depth(), 1);
    }

    #[test]
    fn starting_confidence_matrix() {
        assert_eq!(
            Classification::ThinkingPattern.starting_confidence(Certainty::High),
            0.38
        );
        assert_eq!(
            Classification::DesignPrinciple.starting_confidence(Certainty::Low),
            0.28
        );
        assert_eq!(
            Classification::Preference.starting_confidence(Certainty::High),
            0.35
        );
        assert_eq!(
            Classification::QualityStandard.starting_confidence(Certainty::Low),
            0.25
        );
        assert_eq!(
            Classification::BehavioralGap.starting_confidence(Certainty::High),
            0.30
        );
        assert_eq!(
            Classification::BehavioralGap.starting_confidence(Certainty::Low),
            0.20
        );
    }

    #[test]
    fn classification_round_trips_serde() {
        let json = serde_json::to_string(&Classification::ThinkingPattern).unwrap();
        assert_eq!(json, r#""THINKING_PATTERN""#);
        let back: Classification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Classification::ThinkingPattern);
    }

    #[test]
    fn learning_optional_keys_omitted() {
        let l = Learning {
            id: "lrn-1".into(),
            text: "Uses pnpm".into(),
            classification: Classification::Preference,
            confidence: 0.35,
            evidence_count: 1,
            scope: Scope::Global,
            area: "general".into(),
            areas: vec!["general".into()],
            detection_method: DetectionMethod::Regex,
            first_seen: 100,
            last_reinforced: 100,
            decay_weight: 1.0,
            session_ids: vec![],
            inferred: false,
            archived: false,
            archived_reason: None,
            promoted: false,
            evidence: vec![],
            observation_corroborations: 0,
            consolidated_from_group: None,
            consolidated_from_ids: vec![],
            consolidated_into: None,
            cross_session_boosted: false,
            cross_session_count: None,
            classification_upgraded_from: None,
            deep_pattern_upgrade: false,
        };
        let json = serde_json::to_string(&l).unwrap();
        assert!(!json.contains("consolidated_into"));
        assert!(!json.contains("cross_session_boosted"));
        assert!(!json.contains("archived_reason"));
        assert!(!json.contains("deep_pattern_upgrade"));
    }

    #[test]
    fn terminal_flags_block_activity() {
        let mut l: Learning = serde_json::from_value(serde_json::json!({
            "id": "lrn-2", "text": "Uses jest",
            "classification": "PREFERENCE", "confidence": 0.9,
            "evidence_count": 5, "area": "testing",
            "detection_method": "regex", "first_seen": 0, "last_reinforced": 0
        }))
        .unwrap();
        assert!(l.active(0.45));
        assert!(l.promotable());
        l.promoted = true;
        assert!(!l.active(0.45));
        assert!(!l.promotable());
    }

    #[test]
    fn inferred_never_active() {
        let mut l: Learning = serde_json::from_value(serde_json::json!({
            "id": "lrn-3", "text": "Uses pnpm",
            "classification": "PREFERENCE", "confidence": 0.44,
            "evidence_count": 1, "area": "general",
            "detection_method": "claude_observation", "first_seen": 0, "last_reinforced": 0
        }))
        .unwrap();
        l.inferred = true;
        assert!(!l.active(0.44));
    }
}
