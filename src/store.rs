//! The learning store: one JSON document of learnings plus meta, a JSONL
//! write-ahead log of ambiguous pairs, and the per-session buffer. Every
//! mutation re-reads the document before writing — hooks and detached
//! classifier workers race each other, and reinforcement is designed to
//! converge under any interleaving.

use crate::model::{
    ACTIVATION, ARCHIVE, EVIDENCE_CHARS, Evidence, INFERRED_CAP, Learning, LearningsDoc,
    DetectionMethod, MAX_EVIDENCE, SessionBuffer, Signal, WalEntry,
};
use crate::text;
use crate::{OpentellError, now_ts};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const LEARNINGS_FILE: &str = "learnings.json";
pub const WAL_FILE: &str = "wal.jsonl";
pub const BUFFER_FILE: &str = "session-buffer.json";
pub const PROFILE_FILE: &str = "profile.json";

const REINFORCE_DELTA: f64 = 0.15;
const CORROBORATE_DELTA: f64 = 0.03;
const INFERRED_BUMP: f64 = 0.05;
const PASSIVE_DELTA: f64 = 0.03;
const ALIGN_DELTA: f64 = 0.25;

/// What `add_candidate` did with a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Created(String),
    Reinforced(String),
    /// An inferred observation was validated by this explicit signal.
    Aligned(String),
}

/// What `add_observation` did with an assistant observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationOutcome {
    Corroborated(String),
    ReinforcedInferred(String),
    Created(String),
}

pub struct Store {
    dir: PathBuf,
}

#[cfg(unix)]
fn secure_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn secure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Whole-file write via temp + rename, so readers never see a torn document.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OpentellError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl Store {
    pub fn open(dir: &Path) -> Result<Store, OpentellError> {
        secure_dir(dir)?;
        Ok(Store { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn learnings_path(&self) -> PathBuf {
        self.dir.join(LEARNINGS_FILE)
    }

    fn wal_path(&self) -> PathBuf {
        self.dir.join(WAL_FILE)
    }

    fn buffer_path(&self) -> PathBuf {
        self.dir.join(BUFFER_FILE)
    }

    // --- Document ---

    /// Missing or corrupt document initializes empty: losing state is
    /// preferred over crashing inside a hook.
    pub fn load(&self) -> LearningsDoc {
        match std::fs::read_to_string(self.learnings_path()) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    crate::log::warn(&self.dir, &format!("learnings.json corrupt, starting empty: {e}"));
                    LearningsDoc::default()
                }
            },
            Err(_) => LearningsDoc::default(),
        }
    }

    pub fn save(&self, doc: &LearningsDoc) -> Result<(), OpentellError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.learnings_path(), &bytes)
    }

    fn generate_id(doc: &LearningsDoc, seed: &str, ts: i64) -> String {
        use std::hash::{Hash, Hasher};
        let mut salt = 0u64;
        loop {
            let mut h = std::hash::DefaultHasher::new();
            seed.hash(&mut h);
            ts.hash(&mut h);
            salt.hash(&mut h);
            let id = format!("lrn-{:012x}", h.finish() & 0xffff_ffff_ffff);
            if !doc.learnings.iter().any(|l| l.id == id) {
                return id;
            }
            salt += 1;
        }
    }

    // --- Insertion ---

    /// Insert an explicit signal: align with a matching inferred learning,
    /// archive anything it contradicts, merge with a duplicate, or create.
    pub fn add_candidate(
        &self,
        signal: &Signal,
        session_id: Option<&str>,
        pair: Option<(&str, &str)>,
    ) -> Result<AddOutcome, OpentellError> {
        let mut doc = self.load();
        let now = now_ts();
        let outcome = insert_signal(&mut doc, signal, session_id, pair, now);
        self.save(&doc)?;
        Ok(outcome)
    }

    /// Insert an assistant observation. Observations corroborate or create
    /// inferred rows; they can never activate a learning on their own.
    pub fn add_observation(
        &self,
        signal: &Signal,
        session_id: Option<&str>,
    ) -> Result<ObservationOutcome, OpentellError> {
        let mut doc = self.load();
        let now = now_ts();
        let core = text::core_of(&signal.text);

        // An existing active learning saying the same thing gets a nudge, not
        // a new row.
        if let Some(l) = doc.learnings.iter_mut().find(|l| {
            !l.archived && !l.inferred && text::cores_similar(&text::core_of(&l.text), &core, 0.7)
        }) {
            l.confidence = (l.confidence + CORROBORATE_DELTA).min(1.0);
            l.observation_corroborations += 1;
            let id = l.id.clone();
            self.save(&doc)?;
            return Ok(ObservationOutcome::Corroborated(id));
        }

        if let Some(l) = doc.learnings.iter_mut().find(|l| {
            !l.archived && l.inferred && text::cores_similar(&text::core_of(&l.text), &core, 0.7)
        }) {
            l.confidence = (l.confidence + INFERRED_BUMP).min(INFERRED_CAP);
            l.evidence_count += 1;
            l.last_reinforced = now;
            if let Some(sid) = session_id
                && !l.session_ids.iter().any(|s| s == sid)
            {
                l.session_ids.push(sid.to_string());
            }
            let id = l.id.clone();
            self.save(&doc)?;
            return Ok(ObservationOutcome::ReinforcedInferred(id));
        }

        let id = Self::generate_id(&doc, &signal.text, now);
        doc.learnings.push(Learning {
            id: id.clone(),
            text: signal.text.clone(),
            classification: signal.classification,
            confidence: signal.confidence.min(INFERRED_CAP),
            evidence_count: 1,
            scope: signal.scope,
            area: signal.area.clone(),
            areas: vec![signal.area.clone()],
            detection_method: signal.detection_method,
            first_seen: now,
            last_reinforced: now,
            decay_weight: 1.0,
            session_ids: session_id.map(|s| vec![s.to_string()]).unwrap_or_default(),
            inferred: true,
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
        });
        self.save(&doc)?;
        Ok(ObservationOutcome::Created(id))
    }

    // --- Queries ---

    pub fn get_active(&self, threshold: f64) -> Vec<Learning> {
        self.load()
            .learnings
            .into_iter()
            .filter(|l| l.active(threshold))
            .collect()
    }

    pub fn get_all(&self) -> Vec<Learning> {
        self.load().learnings
    }

    pub fn get_promotable(&self) -> Vec<Learning> {
        self.load()
            .learnings
            .into_iter()
            .filter(|l| l.promotable())
            .collect()
    }

    pub fn mark_promoted(&self, ids: &[String]) -> Result<usize, OpentellError> {
        let mut doc = self.load();
        let mut n = 0;
        for l in doc.learnings.iter_mut() {
            if ids.contains(&l.id) && !l.promoted {
                l.promoted = true;
                n += 1;
            }
        }
        self.save(&doc)?;
        Ok(n)
    }

    pub fn remove_by_id(&self, id: &str) -> Result<bool, OpentellError> {
        let mut doc = self.load();
        let before = doc.learnings.len();
        doc.learnings.retain(|l| l.id != id);
        let removed = doc.learnings.len() < before;
        self.save(&doc)?;
        Ok(removed)
    }

    // --- Lifecycle ---

    /// Time-based confidence erosion. Guarded by a meta timestamp so a
    /// repeated run in the same second is a no-op.
    pub fn apply_decay(&self) -> Result<usize, OpentellError> {
        let mut doc = self.load();
        let now = now_ts();
        if doc.meta.last_decay == Some(now) {
            return Ok(0);
        }
        let mut archived = 0;
        for l in doc.learnings.iter_mut() {
            if l.terminal() {
                continue;
            }
            let days = (now - l.last_reinforced) as f64 / 86400.0;
            if days > 30.0 {
                l.decay_weight *= 0.90;
                l.confidence *= l.decay_weight;
            } else if days > 14.0 {
                l.decay_weight *= 0.95;
                l.confidence *= l.decay_weight;
            }
            if l.confidence < ARCHIVE {
                l.archived = true;
                l.archived_reason = Some("Decayed below threshold".into());
                archived += 1;
            }
        }
        doc.meta.last_decay = Some(now);
        self.save(&doc)?;
        Ok(archived)
    }

    /// Inferred learnings drift slowly upward while they keep being plausible,
    /// but never past the inferred cap.
    pub fn apply_passive_accumulation(&self) -> Result<(), OpentellError> {
        let mut doc = self.load();
        for l in doc.learnings.iter_mut() {
            if l.inferred && !l.terminal() {
                l.confidence = (l.confidence + PASSIVE_DELTA).min(INFERRED_CAP);
            }
        }
        self.save(&doc)
    }

    pub fn accept_observation(&self, id: &str) -> Result<bool, OpentellError> {
        let mut doc = self.load();
        let mut found = false;
        if let Some(l) = doc.learnings.iter_mut().find(|l| l.id == id && l.inferred) {
            l.inferred = false;
            l.detection_method = DetectionMethod::ClaudeObservationAccepted;
            found = true;
        }
        self.save(&doc)?;
        Ok(found)
    }

    pub fn reject_observation(&self, id: &str) -> Result<bool, OpentellError> {
        let mut doc = self.load();
        let mut found = false;
        if let Some(l) = doc.learnings.iter_mut().find(|l| l.id == id && l.inferred) {
            l.archived = true;
            l.archived_reason = Some("Rejected by developer".into());
            found = true;
        }
        self.save(&doc)?;
        Ok(found)
    }

    pub fn increment_session_count(&self) -> Result<u32, OpentellError> {
        let mut doc = self.load();
        doc.meta.total_sessions += 1;
        let n = doc.meta.total_sessions;
        self.save(&doc)?;
        Ok(n)
    }

    /// Archive the weakest learnings once the document outgrows the cap.
    pub fn enforce_cap(&self, max_learnings: usize) -> Result<usize, OpentellError> {
        let mut doc = self.load();
        let mut live: Vec<usize> = (0..doc.learnings.len())
            .filter(|&i| !doc.learnings[i].terminal())
            .collect();
        if live.len() <= max_learnings {
            return Ok(0);
        }
        live.sort_by(|&a, &b| {
            doc.learnings[a]
                .confidence
                .partial_cmp(&doc.learnings[b].confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let excess = live.len() - max_learnings;
        for &i in live.iter().take(excess) {
            doc.learnings[i].archived = true;
            doc.learnings[i].archived_reason = Some("Capacity limit".into());
        }
        self.save(&doc)?;
        Ok(excess)
    }

    // --- Export / import / reset ---

    pub fn export(&self) -> Result<String, OpentellError> {
        Ok(serde_json::to_string_pretty(&self.load())?)
    }

    /// Merge an exported document back in. Ids already present are skipped;
    /// textual duplicates collapse per the usual rule.
    pub fn import(&self, dump: &str) -> Result<usize, OpentellError> {
        let imported: LearningsDoc =
            serde_json::from_str(dump).map_err(|e| OpentellError::Config(format!("import: {e}")))?;
        let mut doc = self.load();
        let mut added = 0;
        for l in imported.learnings {
            let exists = doc.learnings.iter().any(|e| {
                e.id == l.id || (!e.archived && !l.archived && text::is_duplicate(&e.text, &l.text))
            });
            if !exists {
                doc.learnings.push(l);
                added += 1;
            }
        }
        doc.meta.total_sessions = doc.meta.total_sessions.max(imported.meta.total_sessions);
        self.save(&doc)?;
        Ok(added)
    }

    pub fn reset(&self) -> Result<(), OpentellError> {
        for f in [
            self.learnings_path(),
            self.wal_path(),
            self.buffer_path(),
            self.dir.join(PROFILE_FILE),
        ] {
            if f.exists() {
                std::fs::remove_file(f)?;
            }
        }
        Ok(())
    }

    // --- WAL ---

    pub fn append_wal(&self, entry: &WalEntry) -> Result<(), OpentellError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.wal_path())?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every parseable entry. Non-destructive: pairing with
    /// `remove_from_wal` or `clear_wal` is the caller's job.
    pub fn drain_wal(&self) -> Vec<WalEntry> {
        let content = match std::fs::read_to_string(self.wal_path()) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    pub fn remove_from_wal(&self, entry: &WalEntry) -> Result<(), OpentellError> {
        let remaining: Vec<WalEntry> = self
            .drain_wal()
            .into_iter()
            .filter(|e| e != entry)
            .collect();
        let mut out = String::new();
        for e in &remaining {
            out.push_str(&serde_json::to_string(e)?);
            out.push('\n');
        }
        write_atomic(&self.wal_path(), out.as_bytes())
    }

    pub fn clear_wal(&self) -> Result<(), OpentellError> {
        let path = self.wal_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    // --- Session buffer ---

    pub fn load_buffer(&self) -> SessionBuffer {
        match std::fs::read_to_string(self.buffer_path()) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => SessionBuffer::default(),
        }
    }

    pub fn save_buffer(&self, buffer: &SessionBuffer) -> Result<(), OpentellError> {
        let bytes = serde_json::to_vec(buffer)?;
        write_atomic(&self.buffer_path(), &bytes)
    }

    pub fn clear_buffer(&self) -> Result<(), OpentellError> {
        let path = self.buffer_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// --- Insert logic, separated for direct testing ---

fn push_evidence(l: &mut Learning, pair: Option<(&str, &str)>, now: i64) {
    if let Some((assistant, developer)) = pair {
        l.evidence.push(Evidence {
            claude_said: truncate_chars(assistant, EVIDENCE_CHARS),
            user_said: truncate_chars(developer, EVIDENCE_CHARS),
            ts: now,
        });
        while l.evidence.len() > MAX_EVIDENCE {
            l.evidence.remove(0);
        }
    }
}

fn add_session(l: &mut Learning, session_id: Option<&str>) {
    if let Some(sid) = session_id
        && !l.session_ids.iter().any(|s| s == sid)
    {
        l.session_ids.push(sid.to_string());
    }
}

fn style_opposites() -> &'static Vec<(Regex, Regex)> {
    static COMPILED: OnceLock<Vec<(Regex, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        text::STYLE_OPPOSITES
            .iter()
            .map(|(a, b)| (Regex::new(a).unwrap(), Regex::new(b).unwrap()))
            .collect()
    })
}

fn instead_of() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(.+?)\s+instead\s+of\s+(.+)$").unwrap())
}

/// Does the incoming text supersede an existing learning?
fn contradicts(new_text: &str, existing: &Learning) -> bool {
    let new_lower = new_text.to_lowercase();
    let existing_lower = existing.text.to_lowercase();
    let new_core = text::core_of(new_text);
    let existing_core = text::core_of(&existing.text);

    // "X instead of Y" — the displaced Y shows up in the old learning.
    if let Some(caps) = instead_of().captures(new_text) {
        let displaced = text::normalize(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
        if text::contains_word(&existing_core, &displaced) {
            return true;
        }
    }

    // Same tool slot, different tool.
    if let (Some((new_tool, new_cat)), Some((old_tool, old_cat))) =
        (text::tool_category(&new_core), text::tool_category(&existing_core))
        && new_cat == old_cat
        && new_tool != old_tool
    {
        return true;
    }

    // Opposite stylistic stances.
    for (left, right) in style_opposites() {
        if (left.is_match(&new_lower) && right.is_match(&existing_lower))
            || (right.is_match(&new_lower) && left.is_match(&existing_lower))
        {
            return true;
        }
    }

    // Avoids-X against uses-X.
    if text::prefixes_contradict(text::prefix_of(new_text), text::prefix_of(&existing.text))
        && text::cores_similar(&new_core, &existing_core, 0.6)
    {
        return true;
    }

    false
}

pub(crate) fn insert_signal(
    doc: &mut LearningsDoc,
    signal: &Signal,
    session_id: Option<&str>,
    pair: Option<(&str, &str)>,
    now: i64,
) -> AddOutcome {
    let core = text::core_of(&signal.text);

    // Alignment: an explicit correction validates a pending inferred row.
    let aligned = doc.learnings.iter_mut().find(|l| {
        !l.terminal() && l.inferred && text::cores_similar(&text::core_of(&l.text), &core, 0.7)
    });
    if let Some(l) = aligned {
        l.inferred = false;
        l.confidence = (l.confidence + ALIGN_DELTA).max(ACTIVATION).min(1.0);
        l.detection_method = DetectionMethod::ClaudeObservationValidated;
        l.evidence_count += 1;
        l.last_reinforced = now;
        l.decay_weight = 1.0;
        add_session(l, session_id);
        push_evidence(l, pair, now);
        return AddOutcome::Aligned(l.id.clone());
    }

    // Contradiction pass: everything the new signal supersedes is archived.
    let supersede_reason = format!("Superseded by: {}", signal.text);
    for l in doc.learnings.iter_mut() {
        if !l.archived && !l.promoted && contradicts(&signal.text, l) {
            l.archived = true;
            l.archived_reason = Some(supersede_reason.clone());
        }
    }

    // Duplicate pass: merge into the surviving match if one exists.
    let duplicate = doc
        .learnings
        .iter_mut()
        .find(|l| !l.terminal() && text::is_duplicate(&l.text, &signal.text));
    if let Some(l) = duplicate {
        l.confidence = (l.confidence + REINFORCE_DELTA).min(1.0);
        l.evidence_count += 1;
        l.last_reinforced = now;
        l.decay_weight = 1.0;
        if !l.areas.iter().any(|a| a == &signal.area) {
            l.areas.push(signal.area.clone());
        }
        if signal.classification.depth() > l.classification.depth() {
            l.classification = signal.classification;
        }
        if signal.text.len() > l.text.len() {
            l.text = signal.text.clone();
        }
        add_session(l, session_id);
        push_evidence(l, pair, now);
        return AddOutcome::Reinforced(l.id.clone());
    }

    let id = Store::generate_id(doc, &signal.text, now);
    let mut learning = Learning {
        id: id.clone(),
        text: signal.text.clone(),
        classification: signal.classification,
        confidence: signal.confidence.clamp(0.0, 1.0),
        evidence_count: 1,
        scope: signal.scope,
        area: signal.area.clone(),
        areas: vec![signal.area.clone()],
        detection_method: signal.detection_method,
        first_seen: now,
        last_reinforced: now,
        decay_weight: 1.0,
        session_ids: session_id.map(|s| vec![s.to_string()]).unwrap_or_default(),
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
    push_evidence(&mut learning, pair, now);
    doc.learnings.push(learning);
    AddOutcome::Created(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Classification, Scope};
    use tempfile::TempDir;

    fn signal(text: &str, confidence: f64) -> Signal {
        Signal {
            text: text.into(),
            confidence,
            classification: Classification::Preference,
            scope: Scope::Global,
            area: "general".into(),
            detection_method: DetectionMethod::Regex,
        }
    }

    fn signal_with(text: &str, confidence: f64, classification: Classification) -> Signal {
        Signal {
            classification,
            ..signal(text, confidence)
        }
    }

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn add_candidate_twice_converges() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Prefers pnpm", 0.35), Some("s1"), None).unwrap();
        let outcome = store
            .add_candidate(&signal("Prefers pnpm", 0.35), Some("s2"), None)
            .unwrap();
        assert!(matches!(outcome, AddOutcome::Reinforced(_)));

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].evidence_count, 2);
        assert!((all[0].confidence - 0.50).abs() < 1e-9);
        assert_eq!(all[0].session_ids, vec!["s1", "s2"]);
    }

    #[test]
    fn reinforcement_clamps_at_one() {
        let (_dir, store) = store();
        for i in 0..10 {
            store
                .add_candidate(&signal("Prefers pnpm", 0.35), Some(&format!("s{i}")), None)
                .unwrap();
        }
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].confidence <= 1.0);
        assert_eq!(all[0].evidence_count, 10);
    }

    #[test]
    fn deeper_classification_wins_on_merge() {
        let (_dir, store) = store();
        store
            .add_candidate(&signal_with("Expects error handling", 0.35, Classification::Preference), None, None)
            .unwrap();
        store
            .add_candidate(
                &signal_with("Expects error handling", 0.35, Classification::QualityStandard),
                None,
                None,
            )
            .unwrap();
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].classification, Classification::QualityStandard);
    }

    #[test]
    fn longer_text_replaces_on_merge() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.35), None, None).unwrap();
        store
            .add_candidate(&signal("Uses pnpm — not npm", 0.35), None, None)
            .unwrap();
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "Uses pnpm — not npm");
    }

    #[test]
    fn evidence_ring_capped_at_ten() {
        let (_dir, store) = store();
        for i in 0..15 {
            store
                .add_candidate(
                    &signal("Prefers pnpm", 0.35),
                    None,
                    Some((&format!("assistant turn {i}"), "no, use pnpm")),
                )
                .unwrap();
        }
        let all = store.get_all();
        assert_eq!(all[0].evidence.len(), 10);
        // Oldest entries fell off the front.
        assert!(all[0].evidence[0].claude_said.contains("turn 5"));
    }

    #[test]
    fn evidence_sides_truncated() {
        let (_dir, store) = store();
        let long = "x".repeat(1000);
        store
            .add_candidate(&signal("Prefers pnpm", 0.35), None, Some((&long, &long)))
            .unwrap();
        let all = store.get_all();
        assert_eq!(all[0].evidence[0].claude_said.chars().count(), 300);
        assert_eq!(all[0].evidence[0].user_said.chars().count(), 300);
    }

    // Scenario C: a new tool in the same slot supersedes the old preference.
    #[test]
    fn contradiction_archives_superseded_tool() {
        let (_dir, store) = store();
        for _ in 0..3 {
            store.add_candidate(&signal("Uses jest", 0.35), None, None).unwrap();
        }
        store.add_candidate(&signal("Uses vitest", 0.35), None, None).unwrap();

        let all = store.get_all();
        let live: Vec<_> = all.iter().filter(|l| !l.archived).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].text, "Uses vitest");
        let jest = all.iter().find(|l| l.text == "Uses jest").unwrap();
        assert!(jest.archived);
        assert!(jest.archived_reason.as_deref().unwrap().contains("Superseded by"));
    }

    #[test]
    fn instead_of_supersedes_displaced() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses moment", 0.35), None, None).unwrap();
        store
            .add_candidate(&signal("Uses dayjs instead of moment", 0.35), None, None)
            .unwrap();
        let live: Vec<_> = store.get_all().into_iter().filter(|l| !l.archived).collect();
        assert_eq!(live.len(), 1);
        assert!(live[0].text.contains("dayjs"));
    }

    #[test]
    fn avoids_supersedes_uses() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses default exports", 0.35), None, None).unwrap();
        store.add_candidate(&signal("Avoids default exports", 0.35), None, None).unwrap();
        let all = store.get_all();
        let live: Vec<_> = all.iter().filter(|l| !l.archived).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].text, "Avoids default exports");
    }

    #[test]
    fn style_opposites_supersede() {
        let (_dir, store) = store();
        store
            .add_candidate(&signal("Prefers verbose detailed responses", 0.35), None, None)
            .unwrap();
        store
            .add_candidate(&signal("Prefers concise responses", 0.35), None, None)
            .unwrap();
        let live: Vec<_> = store.get_all().into_iter().filter(|l| !l.archived).collect();
        assert_eq!(live.len(), 1);
        assert!(live[0].text.contains("concise"));
    }

    // Scenario E: explicit correction validates a pending inferred row.
    #[test]
    fn alignment_validates_inferred() {
        let (_dir, store) = store();
        let obs = Signal {
            detection_method: DetectionMethod::ClaudeObservation,
            ..signal("Uses pnpm", 0.20)
        };
        store.add_observation(&obs, Some("s1")).unwrap();

        let outcome = store
            .add_candidate(&signal("Uses pnpm", 0.35), Some("s2"), None)
            .unwrap();
        assert!(matches!(outcome, AddOutcome::Aligned(_)));

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(!all[0].inferred);
        assert!(all[0].confidence >= ACTIVATION);
        assert_eq!(
            all[0].detection_method,
            DetectionMethod::ClaudeObservationValidated
        );
    }

    #[test]
    fn observation_corroborates_active() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.45), None, None).unwrap();
        let obs = Signal {
            detection_method: DetectionMethod::ClaudeObservation,
            ..signal("Uses pnpm", 0.20)
        };
        let outcome = store.add_observation(&obs, None).unwrap();
        assert!(matches!(outcome, ObservationOutcome::Corroborated(_)));
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!((all[0].confidence - 0.48).abs() < 1e-9);
        assert_eq!(all[0].observation_corroborations, 1);
    }

    #[test]
    fn inferred_capped_under_any_sequence() {
        let (_dir, store) = store();
        let obs = Signal {
            detection_method: DetectionMethod::ClaudeObservation,
            ..signal("Uses pnpm", 0.40)
        };
        store.add_observation(&obs, None).unwrap();
        for _ in 0..10 {
            store.add_observation(&obs, None).unwrap();
            store.apply_passive_accumulation().unwrap();
        }
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].inferred);
        assert!(all[0].confidence <= INFERRED_CAP + 1e-9);
    }

    #[test]
    fn passive_accumulation_never_activates() {
        let (_dir, store) = store();
        let obs = Signal {
            detection_method: DetectionMethod::ClaudeObservation,
            ..signal("Uses tailwind", 0.25)
        };
        store.add_observation(&obs, None).unwrap();
        for _ in 0..20 {
            store.apply_passive_accumulation().unwrap();
        }
        assert!(store.get_active(ACTIVATION).is_empty());
    }

    // Scenario F: stale learnings decay and eventually archive.
    #[test]
    fn decay_erodes_and_archives() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses grunt", 0.20), None, None).unwrap();
        {
            let mut doc = store.load();
            doc.learnings[0].last_reinforced = now_ts() - 40 * 86400;
            store.save(&doc).unwrap();
        }
        store.apply_decay().unwrap();
        let l = &store.get_all()[0];
        assert!((l.decay_weight - 0.90).abs() < 1e-9);
        assert!((l.confidence - 0.18).abs() < 1e-9);
        assert!(!l.archived);

        // Push it under the archive floor across further cycles.
        for i in 0..3 {
            let mut doc = store.load();
            doc.learnings[0].last_reinforced = now_ts() - 40 * 86400;
            doc.meta.last_decay = Some(i);
            store.save(&doc).unwrap();
            store.apply_decay().unwrap();
        }
        let l = &store.get_all()[0];
        assert!(l.archived);
        assert_eq!(l.archived_reason.as_deref(), Some("Decayed below threshold"));
    }

    #[test]
    fn decay_twice_same_second_is_idempotent() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.35), None, None).unwrap();
        {
            let mut doc = store.load();
            doc.learnings[0].last_reinforced = now_ts() - 20 * 86400;
            store.save(&doc).unwrap();
        }
        store.apply_decay().unwrap();
        let first = store.export().unwrap();
        store.apply_decay().unwrap();
        let second = store.export().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mid_window_decay_uses_soft_rate() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.40), None, None).unwrap();
        {
            let mut doc = store.load();
            doc.learnings[0].last_reinforced = now_ts() - 20 * 86400;
            store.save(&doc).unwrap();
        }
        store.apply_decay().unwrap();
        let l = &store.get_all()[0];
        assert!((l.decay_weight - 0.95).abs() < 1e-9);
        assert!((l.confidence - 0.38).abs() < 1e-9);
    }

    #[test]
    fn fresh_learnings_untouched_by_decay() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.40), None, None).unwrap();
        store.apply_decay().unwrap();
        let l = &store.get_all()[0];
        assert_eq!(l.decay_weight, 1.0);
        assert!((l.confidence - 0.40).abs() < 1e-9);
    }

    #[test]
    fn promotable_set_definition() {
        let (_dir, store) = store();
        let mut doc = LearningsDoc::default();
        for (i, (conf, evidence, inferred)) in
            [(0.85, 5, false), (0.85, 3, false), (0.70, 6, false), (0.85, 5, true)]
                .iter()
                .enumerate()
        {
            insert_signal(&mut doc, &signal(&format!("Uses thing{i}"), *conf), None, None, 100);
            let l = doc.learnings.last_mut().unwrap();
            l.evidence_count = *evidence;
            l.inferred = *inferred;
        }
        store.save(&doc).unwrap();
        let promotable = store.get_promotable();
        assert_eq!(promotable.len(), 1);
        assert_eq!(promotable[0].text, "Uses thing0");
    }

    #[test]
    fn mark_promoted_excludes_from_active() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.90), None, None).unwrap();
        let id = store.get_all()[0].id.clone();
        store.mark_promoted(&[id]).unwrap();
        assert!(store.get_active(0.45).is_empty());
        // Promoted learnings are not reinforced either.
        store.add_candidate(&signal("Uses pnpm", 0.35), None, None).unwrap();
        let all = store.get_all();
        let promoted = all.iter().find(|l| l.promoted).unwrap();
        assert_eq!(promoted.evidence_count, 1);
    }

    #[test]
    fn wal_append_drain_round_trip() {
        let (_dir, store) = store();
        let entry = WalEntry {
            claude_said: "I'll use npm".into(),
            user_said: "hmm, what about the lockfile".into(),
            error_context: None,
            tool_context: Some("bash: npm install".into()),
            written_at: 100,
        };
        store.append_wal(&entry).unwrap();
        let drained = store.drain_wal();
        assert_eq!(drained, vec![entry.clone()]);
        // Drain is non-destructive.
        assert_eq!(store.drain_wal().len(), 1);

        store.remove_from_wal(&entry).unwrap();
        assert!(store.drain_wal().is_empty());
    }

    #[test]
    fn wal_skips_malformed_lines() {
        let (dir, store) = store();
        std::fs::write(
            dir.path().join(WAL_FILE),
            "{broken\n{\"claude_said\":\"a\",\"user_said\":\"b\",\"written_at\":1}\n",
        )
        .unwrap();
        let drained = store.drain_wal();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].claude_said, "a");
    }

    #[test]
    fn clear_wal_removes_everything() {
        let (_dir, store) = store();
        for i in 0..3 {
            store
                .append_wal(&WalEntry {
                    claude_said: format!("turn {i}"),
                    user_said: "ok but why".into(),
                    error_context: None,
                    tool_context: None,
                    written_at: i,
                })
                .unwrap();
        }
        store.clear_wal().unwrap();
        assert!(store.drain_wal().is_empty());
    }

    #[test]
    fn export_reset_import_round_trip() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.50), Some("s1"), None).unwrap();
        store.add_candidate(&signal("Expects tests", 0.45), Some("s1"), None).unwrap();
        let dump = store.export().unwrap();

        store.reset().unwrap();
        assert!(store.get_all().is_empty());

        let added = store.import(&dump).unwrap();
        assert_eq!(added, 2);
        let texts: Vec<String> = store.get_all().into_iter().map(|l| l.text).collect();
        assert!(texts.contains(&"Uses pnpm".to_string()));
        assert!(texts.contains(&"Expects tests".to_string()));
    }

    #[test]
    fn import_skips_collisions() {
        let (_dir, store) = store();
        store.add_candidate(&signal("Uses pnpm", 0.50), None, None).unwrap();
        let dump = store.export().unwrap();
        let added = store.import(&dump).unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.get_all().len(), 1);
    }

    #[test]
    fn corrupt_document_initializes_empty() {
        let (dir, store) = store();
        std::fs::write(dir.path().join(LEARNINGS_FILE), "{{{").unwrap();
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn capacity_archives_weakest_first() {
        let (_dir, store) = store();
        for i in 0..5 {
            store
                .add_candidate(&signal(&format!("Uses thing{i}"), 0.20 + i as f64 * 0.10), None, None)
                .unwrap();
        }
        store.enforce_cap(3).unwrap();
        let live: Vec<_> = store.get_all().into_iter().filter(|l| !l.archived).collect();
        assert_eq!(live.len(), 3);
        assert!(live.iter().all(|l| l.confidence >= 0.40));
    }

    #[test]
    fn accept_and_reject_observations() {
        let (_dir, store) = store();
        let obs = Signal {
            detection_method: DetectionMethod::ClaudeObservation,
            ..signal("Uses pnpm", 0.25)
        };
        store.add_observation(&obs, None).unwrap();
        let id = store.get_all()[0].id.clone();

        assert!(store.accept_observation(&id).unwrap());
        let l = &store.get_all()[0];
        assert!(!l.inferred);
        assert_eq!(l.detection_method, DetectionMethod::ClaudeObservationAccepted);

        let obs2 = Signal {
            detection_method: DetectionMethod::ClaudeObservation,
            ..signal("Uses biome for linting", 0.25)
        };
        store.add_observation(&obs2, None).unwrap();
        let id2 = store
            .get_all()
            .iter()
            .find(|l| l.inferred)
            .unwrap()
            .id
            .clone();
        assert!(store.reject_observation(&id2).unwrap());
        let l2 = store.get_all().into_iter().find(|l| l.id == id2).unwrap();
        assert!(l2.archived);
    }

    #[test]
    fn buffer_round_trip() {
        let (_dir, store) = store();
        let mut buffer = SessionBuffer {
            session_id: "s1".into(),
            last_stop_ts: 42,
            ..Default::default()
        };
        buffer.analyzed.push("fp1".into());
        store.save_buffer(&buffer).unwrap();
        let loaded = store.load_buffer();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.last_stop_ts, 42);
        assert_eq!(loaded.analyzed, vec!["fp1"]);
        store.clear_buffer().unwrap();
        assert_eq!(store.load_buffer().session_id, "");
    }

    #[test]
    fn no_duplicate_pairs_among_live_learnings() {
        let (_dir, store) = store();
        let texts = [
            "Prefers pnpm",
            "Uses pnpm",
            "Uses pnpm — not npm",
            "Expects tests",
            "Expects tests for new code",
        ];
        for t in texts {
            store.add_candidate(&signal(t, 0.35), None, None).unwrap();
        }
        let live: Vec<_> = store.get_all().into_iter().filter(|l| !l.archived).collect();
        for (i, a) in live.iter().enumerate() {
            for b in live.iter().skip(i + 1) {
                assert!(
                    !text::is_duplicate(&a.text, &b.text),
                    "live duplicates: {:?} / {:?}",
                    a.text,
                    b.text
                );
            }
        }
    }
}
