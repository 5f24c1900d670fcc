//! Promotion: export high-confidence, well-evidenced learnings into the
//! host's per-project instruction file, inside a replaceable fenced section.
//! Promoted learnings leave the injection rotation for good.

use crate::model::{Classification, Learning};
use crate::store::Store;
use crate::OpentellError;
use std::path::Path;

pub const FENCE_START: &str = "<!-- opentell:start -->";
pub const FENCE_END: &str = "<!-- opentell:end -->";

const HEADINGS: &[(Classification, &str)] = &[
    (Classification::ThinkingPattern, "How We Build"),
    (Classification::DesignPrinciple, "Architecture"),
    (Classification::QualityStandard, "Quality Standards"),
    (Classification::Preference, "Conventions"),
    (Classification::BehavioralGap, "Common Gaps to Watch"),
];

/// Render the fenced section for a set of promotable learnings.
pub fn render_section(learnings: &[Learning]) -> String {
    let mut out = String::new();
    out.push_str(FENCE_START);
    out.push_str("\n## Developer conventions (learned)\n\n");
    out.push_str(
        "These were learned from working sessions and promoted automatically; edit or delete freely.\n",
    );

    for (classification, heading) in HEADINGS {
        let group: Vec<&Learning> = learnings
            .iter()
            .filter(|l| l.classification == *classification)
            .collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("\n### {heading}\n"));
        for l in group {
            out.push_str(&format!("- {}\n", l.text));
        }
    }

    out.push('\n');
    out.push_str(FENCE_END);
    out
}

/// Splice the fenced section into existing file content, replacing any
/// previous section.
pub fn splice(existing: &str, section: &str) -> String {
    if let (Some(start), Some(end)) = (existing.find(FENCE_START), existing.find(FENCE_END)) {
        if start < end {
            let mut out = String::new();
            out.push_str(&existing[..start]);
            out.push_str(section);
            out.push_str(&existing[end + FENCE_END.len()..]);
            return out;
        }
    }
    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(section);
    out.push('\n');
    out
}

/// Promote everything currently promotable into `target` and mark it
/// promoted. Returns the promoted learnings.
pub fn promote(store: &Store, target: &Path) -> Result<Vec<Learning>, OpentellError> {
    let promotable = store.get_promotable();
    if promotable.is_empty() {
        return Ok(Vec::new());
    }

    let section = render_section(&promotable);
    let existing = std::fs::read_to_string(target).unwrap_or_default();
    std::fs::write(target, splice(&existing, &section))?;

    let ids: Vec<String> = promotable.iter().map(|l| l.id.clone()).collect();
    store.mark_promoted(&ids)?;
    Ok(promotable)
}
