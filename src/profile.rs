//! The developer profile: one narrative paragraph regenerated when the
//! active learning set has drifted since the last synthesis.

use crate::classifier::llm_request;
use crate::config::EngineConfig;
use crate::model::{ACTIVATION, Classification, Learning, Profile};
use crate::store::{PROFILE_FILE, Store};
use crate::{OpentellError, now_ts, prompts, stats};
use std::path::Path;

const MIN_ACTIVE_FOR_PROFILE: usize = 3;
const SESSIONS_BETWEEN_SYNTHESES: u32 = 10;
const PROFILE_MAX_TOKENS: u32 = 512;

/// Stable digest of the active set: any reinforcement, archive, or text
/// rewrite changes it.
pub fn checksum(active: &[Learning]) -> String {
    use std::hash::{Hash, Hasher};
    let mut keys: Vec<String> = active
        .iter()
        .map(|l| format!("{}:{:.3}:{}", l.id, l.confidence, l.text))
        .collect();
    keys.sort();
    let mut h = std::hash::DefaultHasher::new();
    for k in &keys {
        k.hash(&mut h);
    }
    format!("{:016x}", h.finish())
}

pub fn load_profile(dir: &Path) -> Option<Profile> {
    let content = std::fs::read_to_string(dir.join(PROFILE_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

fn save_profile(dir: &Path, profile: &Profile) -> Result<(), OpentellError> {
    let bytes = serde_json::to_vec_pretty(profile)?;
    std::fs::write(dir.join(PROFILE_FILE), bytes)?;
    Ok(())
}

/// A synthesis is due when no profile exists, the active set drifted, or
/// ten sessions have gone by regardless.
pub fn needs_update(store: &Store, threshold: f64) -> bool {
    let active = store.get_active(threshold);
    if active.len() < MIN_ACTIVE_FOR_PROFILE {
        return false;
    }
    let Some(profile) = load_profile(store.dir()) else {
        return true;
    };
    if profile.checksum != checksum(&active) {
        return true;
    }
    let sessions_now = store.load().meta.total_sessions;
    sessions_now >= profile.session_count + SESSIONS_BETWEEN_SYNTHESES
}

/// Classification-grouped sections for the synthesis prompt, depth order.
fn build_sections(active: &[Learning]) -> String {
    let mut out = String::new();
    for classification in Classification::depth_order() {
        let group: Vec<&Learning> = active
            .iter()
            .filter(|l| l.classification == classification)
            .collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("{}:\n", classification.as_str()));
        for l in group {
            out.push_str(&format!("- {} (confidence {:.2})\n", l.text, l.confidence));
        }
        out.push('\n');
    }
    out
}

/// Synthesize and persist a fresh profile. Returns false when skipped
/// (too few learnings, no key).
pub fn synthesize(store: &Store, config: &EngineConfig) -> Result<bool, OpentellError> {
    let active = store.get_active(config.confidence_threshold);
    if active.len() < MIN_ACTIVE_FOR_PROFILE {
        return Ok(false);
    }
    let Some(api_key) = config.api_key() else {
        return Ok(false);
    };

    let sections = build_sections(&active);
    let prompt = prompts::PROFILE_PROMPT.replace("{SECTIONS}", &sections);

    let (text, usage) = llm_request(&api_key, &config.synthesis_model, "", &prompt, PROFILE_MAX_TOKENS)?;
    stats::record(store.dir(), "profile", &config.synthesis_model, &usage);

    let text = text.trim().to_string();
    if text.is_empty() {
        return Ok(false);
    }

    let profile = Profile {
        text,
        generated_at: now_ts(),
        learning_count: active.len(),
        session_count: store.load().meta.total_sessions,
        checksum: checksum(&active),
    };
    save_profile(store.dir(), &profile)?;
    Ok(true)
}
