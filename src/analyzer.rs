//! Cross-session analysis: a learning that keeps resurfacing across distinct
//! sessions is worth more than its per-insert confidence says, and past
//! enough recurrences it stops being a preference and becomes a standard —
//! then a thinking pattern.

use crate::model::{Classification, Learning, LearningsDoc};

const BOOST_SESSIONS: usize = 3;
const UPGRADE_SESSIONS: usize = 4;
const DEEP_UPGRADE_SESSIONS: usize = 5;
const BOOST_DELTA: f64 = 0.10;
const DEEP_UPGRADE_DELTA: f64 = 0.05;

/// Gap between evidence timestamps that implies a new session, for learnings
/// that predate session_ids bookkeeping.
const SESSION_GAP_SECS: i64 = 30 * 60;

/// Estimate distinct sessions from evidence timestamps.
fn sessions_from_evidence(learning: &Learning) -> usize {
    let mut stamps: Vec<i64> = learning.evidence.iter().map(|e| e.ts).collect();
    if stamps.is_empty() {
        return learning.session_ids.len().max(1);
    }
    stamps.sort_unstable();
    let mut sessions = 1;
    for pair in stamps.windows(2) {
        if pair[1] - pair[0] > SESSION_GAP_SECS {
            sessions += 1;
        }
    }
    sessions
}

fn session_count(learning: &Learning) -> usize {
    if learning.session_ids.is_empty() {
        sessions_from_evidence(learning)
    } else {
        learning.session_ids.len()
    }
}

/// Apply boost and upgrades in place. `current_session` is appended to any
/// learning reinforced during the ending session. Returns the number of
/// learnings changed.
pub fn analyze(doc: &mut LearningsDoc, current_session: &str, session_started_at: i64) -> usize {
    let mut changed = 0;

    for l in doc.learnings.iter_mut() {
        if l.terminal() {
            continue;
        }

        // Bookkeeping: a learning touched this session carries its id.
        if session_started_at > 0
            && l.last_reinforced >= session_started_at
            && !current_session.is_empty()
            && !l.session_ids.iter().any(|s| s == current_session)
        {
            l.session_ids.push(current_session.to_string());
        }

        let sessions = session_count(l);
        let mut touched = false;

        if sessions >= BOOST_SESSIONS && !l.cross_session_boosted {
            l.confidence = (l.confidence + BOOST_DELTA).min(1.0);
            l.cross_session_boosted = true;
            l.cross_session_count = Some(sessions as u32);
            touched = true;
        }

        if sessions >= UPGRADE_SESSIONS
            && matches!(
                l.classification,
                Classification::Preference | Classification::BehavioralGap
            )
            && l.classification_upgraded_from.is_none()
        {
            l.classification_upgraded_from = Some(l.classification);
            l.classification = Classification::QualityStandard;
            touched = true;
        }

        if sessions >= DEEP_UPGRADE_SESSIONS
            && l.classification == Classification::QualityStandard
            && !l.deep_pattern_upgrade
        {
            l.classification = Classification::ThinkingPattern;
            l.confidence = (l.confidence + DEEP_UPGRADE_DELTA).min(1.0);
            l.deep_pattern_upgrade = true;
            touched = true;
        }

        if touched {
            changed += 1;
        }
    }

    changed
}
