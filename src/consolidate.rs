//! Consolidation: cluster related learnings by affinity keywords and ask the
//! synthesis model for the one deeper instinct underneath each cluster. Runs
//! only from session-end, and only when enough has accumulated since the
//! last run.

use crate::classifier::llm_request;
use crate::config::EngineConfig;
use crate::model::{
    ACTIVATION, Classification, DetectionMethod, Learning, LearningsDoc, Scope,
};
use crate::store::Store;
use crate::{OpentellError, now_ts, prompts, stats};

const MIN_ACTIVE_FOR_CONSOLIDATION: usize = 6;
const SESSIONS_BETWEEN_RUNS: u32 = 5;
const SYNTHESIS_MAX_TOKENS: u32 = 256;
const MAX_CONSOLIDATED_CONFIDENCE: f64 = 0.95;

pub struct AffinityGroup {
    pub id: &'static str,
    pub keywords: &'static [&'static str],
    pub min_cluster: usize,
}

pub static AFFINITY_GROUPS: &[AffinityGroup] = &[
    AffinityGroup {
        id: "composability",
        keywords: &["reusab", "composab", "modular", "small function", "single responsibility", "extract"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "user_empathy",
        keywords: &["user", "ux", "accessib", "screen reader", "perspective"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "defensive_design",
        keywords: &["error", "edge case", "validat", "null", "fail", "defensive", "exception"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "data_architecture",
        keywords: &["data model", "schema", "database", "migration", "postgres", "normaliz"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "shipping_standards",
        keywords: &["test", "coverage", "ci", "lint", "review", "quality"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "simplicity_pragmatism",
        keywords: &["simple", "simplicity", "minimal", "yagni", "overengineer", "over-engineer", "pragmat"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "system_thinking",
        keywords: &["scale", "scalab", "architecture", "system", "performance", "distributed"],
        min_cluster: 2,
    },
    AffinityGroup {
        id: "code_clarity",
        keywords: &["naming", "readab", "clarity", "comment", "explicit", "concise"],
        min_cluster: 2,
    },
];

fn is_cluster_member(l: &Learning, group: &AffinityGroup) -> bool {
    if l.terminal() || l.inferred || l.confidence < ACTIVATION {
        return false;
    }
    let lower = l.text.to_lowercase();
    group.keywords.iter().any(|k| lower.contains(k))
}

/// Indices of cluster members per eligible affinity group. A group that has
/// already produced a consolidation is skipped for good.
pub fn find_clusters(doc: &LearningsDoc) -> Vec<(&'static AffinityGroup, Vec<usize>)> {
    let mut clusters = Vec::new();
    for group in AFFINITY_GROUPS {
        let already_done = doc
            .learnings
            .iter()
            .any(|l| l.consolidated_from_group.as_deref() == Some(group.id));
        if already_done {
            continue;
        }
        let members: Vec<usize> = doc
            .learnings
            .iter()
            .enumerate()
            .filter(|(_, l)| is_cluster_member(l, group))
            .map(|(i, _)| i)
            .collect();
        if members.len() >= group.min_cluster {
            clusters.push((group, members));
        }
    }
    clusters
}

pub fn should_consolidate(doc: &LearningsDoc) -> bool {
    let active = doc
        .learnings
        .iter()
        .filter(|l| l.active(ACTIVATION))
        .count();
    if active < MIN_ACTIVE_FOR_CONSOLIDATION {
        return false;
    }
    if let Some(last_session) = doc.meta.consolidation_session
        && doc.meta.total_sessions < last_session + SESSIONS_BETWEEN_RUNS
    {
        return false;
    }
    !find_clusters(doc).is_empty()
}

pub fn mark_consolidation_run(doc: &mut LearningsDoc) {
    doc.meta.last_consolidation = Some(now_ts());
    doc.meta.consolidation_session = Some(doc.meta.total_sessions);
}

/// Build the synthesized learning for one cluster and link it both ways.
/// Pure assembly; the LLM text comes in from the caller.
pub fn apply_consolidation(
    doc: &mut LearningsDoc,
    group_id: &str,
    members: &[usize],
    insight: &str,
    now: i64,
) -> String {
    let avg_confidence: f64 = members
        .iter()
        .map(|&i| doc.learnings[i].confidence)
        .sum::<f64>()
        / members.len() as f64;
    let total_evidence: u32 = members.iter().map(|&i| doc.learnings[i].evidence_count).sum();
    let area = doc.learnings[members[0]].area.clone();
    let member_ids: Vec<String> = members.iter().map(|&i| doc.learnings[i].id.clone()).collect();

    use std::hash::{Hash, Hasher};
    let mut h = std::hash::DefaultHasher::new();
    insight.hash(&mut h);
    now.hash(&mut h);
    let id = format!("lrn-{:012x}", h.finish() & 0xffff_ffff_ffff);

    for &i in members {
        doc.learnings[i].consolidated_into = Some(id.clone());
    }

    doc.learnings.push(Learning {
        id: id.clone(),
        text: insight.trim().to_string(),
        classification: Classification::ThinkingPattern,
        confidence: (avg_confidence + 0.05).min(MAX_CONSOLIDATED_CONFIDENCE),
        evidence_count: total_evidence,
        scope: Scope::Global,
        area: area.clone(),
        areas: vec![area],
        detection_method: DetectionMethod::Consolidation,
        first_seen: now,
        last_reinforced: now,
        decay_weight: 1.0,
        session_ids: vec![],
        inferred: false,
        archived: false,
        archived_reason: None,
        promoted: false,
        evidence: vec![],
        observation_corroborations: 0,
        consolidated_from_group: Some(group_id.to_string()),
        consolidated_from_ids: member_ids,
        consolidated_into: None,
        cross_session_boosted: false,
        cross_session_count: None,
        classification_upgraded_from: None,
        deep_pattern_upgrade: false,
    });

    id
}

/// Run consolidation end to end: find clusters, synthesize one insight per
/// cluster, persist. Per-cluster failures are logged and skipped.
pub fn consolidate(store: &Store, config: &EngineConfig) -> Result<usize, OpentellError> {
    let Some(api_key) = config.api_key() else {
        return Ok(0);
    };

    let mut doc = store.load();
    let clusters: Vec<(&'static AffinityGroup, Vec<usize>)> = find_clusters(&doc);
    if clusters.is_empty() {
        return Ok(0);
    }

    let mut created = 0;
    for (group, members) in clusters {
        let bullets: String = members
            .iter()
            .map(|&i| format!("- {}\n", doc.learnings[i].text))
            .collect();
        let prompt = prompts::CONSOLIDATION_PROMPT.replace("{LEARNINGS}", &bullets);

        match llm_request(&api_key, &config.synthesis_model, "", &prompt, SYNTHESIS_MAX_TOKENS) {
            Ok((insight, usage)) => {
                stats::record(store.dir(), "consolidation", &config.synthesis_model, &usage);
                let insight = insight.trim();
                if insight.is_empty() || insight.len() > 400 {
                    continue;
                }
                apply_consolidation(&mut doc, group.id, &members, insight, now_ts());
                created += 1;
            }
            Err(e) => {
                crate::log::warn(store.dir(), &format!("consolidation for {} failed: {e}", group.id));
            }
        }
    }

    if created > 0 {
        mark_consolidation_run(&mut doc);
        store.save(&doc)?;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Signal;
    use crate::store::insert_signal;

    fn active_doc(texts: &[&str]) -> LearningsDoc {
        let mut doc = LearningsDoc::default();
        for t in texts {
            let signal = Signal {
                text: (*t).into(),
                confidence: 0.55,
                classification: Classification::QualityStandard,
                scope: Scope::Global,
                area: "general".into(),
                detection_method: DetectionMethod::Regex,
            };
            insert_signal(&mut doc, &signal, None, None, 100);
        }
        doc
    }

    const QUALITY_TEXTS: &[&str] = &[
        "Expects error handling in every path",
        "Expects input validation at boundaries",
        "Checks edge case behavior for empty input",
        "Expects tests before merging",
        "Wants lint clean builds",
        "Cares about test coverage numbers",
    ];

    #[test]
    fn clusters_found_by_keyword() {
        let doc = active_doc(QUALITY_TEXTS);
        let clusters = find_clusters(&doc);
        let ids: Vec<&str> = clusters.iter().map(|(g, _)| g.id).collect();
        assert!(ids.contains(&"defensive_design"));
        assert!(ids.contains(&"shipping_standards"));
        let defensive = clusters.iter().find(|(g, _)| g.id == "defensive_design").unwrap();
        assert_eq!(defensive.1.len(), 3);
    }

    #[test]
    fn below_min_cluster_not_emitted() {
        let doc = active_doc(&["Expects error handling", "Uses pnpm"]);
        assert!(find_clusters(&doc).is_empty());
    }

    #[test]
    fn inactive_learnings_excluded_from_clusters() {
        let mut doc = active_doc(&["Expects error handling", "Expects input validation"]);
        doc.learnings[0].confidence = 0.30;
        assert!(find_clusters(&doc).is_empty());
    }

    #[test]
    fn consolidated_group_not_repeated() {
        let mut doc = active_doc(QUALITY_TEXTS);
        let clusters = find_clusters(&doc);
        let (group, members) = clusters
            .iter()
            .find(|(g, _)| g.id == "defensive_design")
            .unwrap();
        apply_consolidation(&mut doc, group.id, members, "Designs for failure first", 200);
        let again = find_clusters(&doc);
        assert!(!again.iter().any(|(g, _)| g.id == "defensive_design"));
    }

    #[test]
    fn consolidation_links_are_bidirectional() {
        let mut doc = active_doc(QUALITY_TEXTS);
        let clusters = find_clusters(&doc);
        let (group, members) = clusters
            .iter()
            .find(|(g, _)| g.id == "defensive_design")
            .unwrap();
        let members = members.clone();
        let id = apply_consolidation(&mut doc, group.id, &members, "Designs for failure first", 200);

        let consolidated = doc.learnings.iter().find(|l| l.id == id).unwrap();
        assert!(consolidated.consolidated_from_ids.len() >= 2);
        assert_eq!(consolidated.classification, Classification::ThinkingPattern);
        assert_eq!(consolidated.detection_method, DetectionMethod::Consolidation);
        // Every referenced member points back.
        for member_id in &consolidated.consolidated_from_ids {
            let member = doc.learnings.iter().find(|l| &l.id == member_id).unwrap();
            assert_eq!(member.consolidated_into.as_ref(), Some(&id));
        }
    }

    #[test]
    fn consolidated_confidence_formula() {
        let mut doc = active_doc(QUALITY_TEXTS);
        let clusters = find_clusters(&doc);
        let (group, members) = clusters
            .iter()
            .find(|(g, _)| g.id == "defensive_design")
            .unwrap();
        let members = members.clone();
        let expected_evidence: u32 = members.iter().map(|&i| doc.learnings[i].evidence_count).sum();
        let id = apply_consolidation(&mut doc, group.id, &members, "Designs for failure first", 200);
        let consolidated = doc.learnings.iter().find(|l| l.id == id).unwrap();
        // avg(0.55..) + 0.05 = 0.60
        assert!((consolidated.confidence - 0.60).abs() < 1e-9);
        assert_eq!(consolidated.evidence_count, expected_evidence);
    }

    #[test]
    fn trigger_needs_six_active() {
        let doc = active_doc(&QUALITY_TEXTS[..5]);
        assert!(!should_consolidate(&doc));
        let doc = active_doc(QUALITY_TEXTS);
        assert!(should_consolidate(&doc));
    }

    #[test]
    fn trigger_respects_session_spacing() {
        let mut doc = active_doc(QUALITY_TEXTS);
        doc.meta.total_sessions = 12;
        doc.meta.consolidation_session = Some(10);
        assert!(!should_consolidate(&doc));
        doc.meta.total_sessions = 15;
        assert!(should_consolidate(&doc));
    }

    #[test]
    fn mark_records_session() {
        let mut doc = active_doc(QUALITY_TEXTS);
        doc.meta.total_sessions = 9;
        mark_consolidation_run(&mut doc);
        assert_eq!(doc.meta.consolidation_session, Some(9));
        assert!(doc.meta.last_consolidation.is_some());
    }
}
