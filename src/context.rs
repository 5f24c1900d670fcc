//! Assemble the context block injected at session start. Two renderings:
//! once enough is known and a profile exists, the narrative paragraph leads;
//! otherwise a structured listing grouped by classification depth.

use crate::model::{Classification, Learning, Scope};
use crate::profile::load_profile;
use crate::store::Store;

const PROFILE_MODE_MIN_ACTIVE: usize = 6;
const AREA_FILTER_MIN_ACTIVE: usize = 15;
const RECENT_FOR_AREAS: usize = 10;

const HEADER: &str = "# What opentell knows about this developer\n";

/// Areas the developer has recently been working in, judged by the most
/// recently reinforced learnings. "general" always passes.
fn active_areas(active: &[Learning]) -> Vec<String> {
    let mut by_recency: Vec<&Learning> = active.iter().collect();
    by_recency.sort_by_key(|l| std::cmp::Reverse(l.last_reinforced));
    let mut areas: Vec<String> = vec!["general".into()];
    for l in by_recency.into_iter().take(RECENT_FOR_AREAS) {
        for a in &l.areas {
            if !areas.contains(a) {
                areas.push(a.clone());
            }
        }
    }
    areas
}

/// Deep learnings and global preferences always inject; narrower learnings
/// only when their areas overlap recent work.
fn passes_area_filter(l: &Learning, areas: &[String]) -> bool {
    match l.classification {
        Classification::ThinkingPattern | Classification::DesignPrinciple => true,
        Classification::Preference if l.scope == Scope::Global => true,
        _ => l.areas.iter().any(|a| areas.contains(a)) || areas.contains(&l.area),
    }
}

fn section(out: &mut String, title: &str, items: &[&Learning]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {title}\n"));
    for l in items {
        out.push_str(&format!("- {}\n", l.text));
    }
}

fn structured(active: &[&Learning]) -> String {
    let mut out = String::from(HEADER);
    let by_class = |c: Classification| -> Vec<&Learning> {
        active.iter().copied().filter(|l| l.classification == c).collect()
    };

    section(&mut out, "How this developer thinks", &by_class(Classification::ThinkingPattern));
    section(&mut out, "Design principles", &by_class(Classification::DesignPrinciple));
    section(&mut out, "Quality standards", &by_class(Classification::QualityStandard));
    section(&mut out, "Watch for", &by_class(Classification::BehavioralGap));

    let preferences = by_class(Classification::Preference);
    let by_scope = |s: Scope| -> Vec<&Learning> {
        preferences.iter().copied().filter(|l| l.scope == s).collect()
    };
    section(&mut out, "Preferences — this repo", &by_scope(Scope::Repo));
    section(&mut out, "Preferences — global", &by_scope(Scope::Global));
    section(&mut out, "Preferences — language", &by_scope(Scope::Language));

    out
}

fn profile_mode(profile_text: &str, active: &[&Learning]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    out.push_str(profile_text.trim());
    out.push('\n');

    let preferences: Vec<&Learning> = active
        .iter()
        .copied()
        .filter(|l| l.classification == Classification::Preference)
        .collect();
    section(&mut out, "Active preferences", &preferences);
    out
}

/// The session-start injection. Empty string when nothing is known yet.
pub fn build(store: &Store, threshold: f64) -> String {
    let active = store.get_active(threshold);
    if active.is_empty() {
        return String::new();
    }

    let filtered: Vec<&Learning> = if active.len() >= AREA_FILTER_MIN_ACTIVE {
        let areas = active_areas(&active);
        active.iter().filter(|l| passes_area_filter(l, &areas)).collect()
    } else {
        active.iter().collect()
    };

    if active.len() >= PROFILE_MODE_MIN_ACTIVE
        && let Some(profile) = load_profile(store.dir())
    {
        return profile_mode(&profile.text, &filtered);
    }

    structured(&filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ACTIVATION, DetectionMethod, Profile, Signal};
    use tempfile::TempDir;

    fn add(store: &Store, text: &str, confidence: f64, classification: Classification, scope: Scope, area: &str) {
        store
            .add_candidate(
                &Signal {
                    text: text.into(),
                    confidence,
                    classification,
                    scope,
                    area: area.into(),
                    detection_method: DetectionMethod::Regex,
                },
                None,
                None,
            )
            .unwrap();
    }

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn empty_store_empty_context() {
        let (_dir, store) = store();
        assert_eq!(build(&store, ACTIVATION), "");
    }

    #[test]
    fn below_threshold_excluded() {
        let (_dir, store) = store();
        add(&store, "Uses pnpm", 0.30, Classification::Preference, Scope::Global, "general");
        assert_eq!(build(&store, ACTIVATION), "");
    }

    #[test]
    fn structured_mode_sections_in_depth_order() {
        let (_dir, store) = store();
        add(&store, "Keeps solutions simple", 0.50, Classification::ThinkingPattern, Scope::Global, "general");
        add(&store, "Separates concerns", 0.50, Classification::DesignPrinciple, Scope::Global, "architecture");
        add(&store, "Expects tests", 0.50, Classification::QualityStandard, Scope::Global, "testing");
        add(&store, "Uses pnpm", 0.50, Classification::Preference, Scope::Global, "general");
        add(&store, "Uses conventional commits", 0.50, Classification::Preference, Scope::Repo, "general");

        let context = build(&store, ACTIVATION);
        assert!(context.starts_with(HEADER));
        let thinking = context.find("How this developer thinks").unwrap();
        let design = context.find("Design principles").unwrap();
        let quality = context.find("Quality standards").unwrap();
        let repo = context.find("Preferences — this repo").unwrap();
        let global = context.find("Preferences — global").unwrap();
        assert!(thinking < design && design < quality && quality < repo && repo < global);
        assert!(context.contains("- Uses pnpm"));
    }

    #[test]
    fn empty_sections_omitted() {
        let (_dir, store) = store();
        add(&store, "Uses pnpm", 0.50, Classification::Preference, Scope::Global, "general");
        let context = build(&store, ACTIVATION);
        assert!(!context.contains("Watch for"));
        assert!(!context.contains("Quality standards"));
    }

    #[test]
    fn profile_mode_when_six_active_and_profile() {
        let (dir, store) = store();
        for i in 0..6 {
            add(&store, &format!("Uses library{i}"), 0.50, Classification::Preference, Scope::Global, "general");
        }
        let profile = Profile {
            text: "Pragmatic builder who ships small and tests at the edges.".into(),
            generated_at: 0,
            learning_count: 6,
            session_count: 1,
            checksum: "x".into(),
        };
        std::fs::write(
            dir.path().join(crate::store::PROFILE_FILE),
            serde_json::to_vec(&profile).unwrap(),
        )
        .unwrap();

        let context = build(&store, ACTIVATION);
        assert!(context.contains("Pragmatic builder"));
        assert!(context.contains("Active preferences"));
        assert!(context.contains("- Uses library0"));
        assert!(!context.contains("Preferences — global"));
    }

    #[test]
    fn structured_mode_when_profile_missing() {
        let (_dir, store) = store();
        for i in 0..6 {
            add(&store, &format!("Uses library{i}"), 0.50, Classification::Preference, Scope::Global, "general");
        }
        let context = build(&store, ACTIVATION);
        assert!(context.contains("Preferences — global"));
    }

    #[test]
    fn area_filter_passes_deep_learnings() {
        let (_dir, store) = store();
        // 15 narrow-area quality standards plus one thinking pattern in an
        // inactive area: the thinking pattern must survive the filter.
        for i in 0..15 {
            add(&store, &format!("Expects check{i}"), 0.50, Classification::QualityStandard, Scope::Global, "backend");
        }
        add(&store, "Thinks about scale early", 0.50, Classification::ThinkingPattern, Scope::Global, "devops");
        let context = build(&store, ACTIVATION);
        assert!(context.contains("Thinks about scale early"));
    }

    #[test]
    fn area_filter_drops_stale_narrow_learnings() {
        let (_dir, store) = store();
        for i in 0..15 {
            add(&store, &format!("Expects check{i}"), 0.50, Classification::QualityStandard, Scope::Global, "backend");
        }
        // A repo-scoped preference in an area nobody touched recently.
        add(&store, "Uses storybook here", 0.50, Classification::Preference, Scope::Repo, "frontend");
        {
            // Make the frontend learning stale relative to the backend ones.
            let mut doc = store.load();
            for l in doc.learnings.iter_mut() {
                if l.area == "frontend" {
                    l.last_reinforced = 1;
                } else {
                    l.last_reinforced = crate::now_ts();
                }
            }
            store.save(&doc).unwrap();
        }
        let context = build(&store, ACTIVATION);
        assert!(!context.contains("Uses storybook here"));
        assert!(context.contains("Expects check0"));
    }
}
