//! The detached classifier worker. A turn-stop hook spawns one of these and
//! exits; the worker outlives it, makes its single round of classifier
//! calls, writes through the normal store API, and removes what it handled
//! from the WAL. Racing a later hook is fine — duplicate insertions collapse
//! into reinforcement.

use crate::config::load_config;
use crate::classifier::{self, Verdict};
use crate::store::Store;
use crate::log;
use std::path::Path;
use std::process::{Command, Stdio};

const ENTRIES_PER_RUN: usize = 3;

/// Fire-and-forget spawn of `opentell classify-worker`. The child is fully
/// detached: no inherited stdio, no wait.
pub fn spawn(dir: &Path) {
    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            log::warn(dir, &format!("worker spawn: no current exe: {e}"));
            return;
        }
    };
    let result = Command::new(exe)
        .arg("classify-worker")
        .arg("--dir")
        .arg(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(e) = result {
        log::warn(dir, &format!("worker spawn failed: {e}"));
    }
}

/// Worker body: classify the oldest queued pairs. A failed classification
/// leaves its entry in the WAL for the session-end drain.
pub fn run(dir: &Path) {
    let config = load_config(dir);
    if config.paused {
        return;
    }
    let store = match Store::open(dir) {
        Ok(s) => s,
        Err(e) => {
            log::warn(dir, &format!("worker: state dir: {e}"));
            return;
        }
    };

    let entries = store.drain_wal();
    for entry in entries.iter().take(ENTRIES_PER_RUN) {
        match classifier::classify(dir, &config, entry) {
            Verdict::Learning(signal) => {
                match store.add_candidate(&signal, None, Some((&entry.claude_said, &entry.user_said))) {
                    Ok(_) => {
                        if let Err(e) = store.remove_from_wal(entry) {
                            log::warn(dir, &format!("worker: wal remove failed: {e}"));
                        }
                    }
                    Err(e) => log::warn(dir, &format!("worker: store failed: {e}")),
                }
            }
            Verdict::NonLearning(_) => {
                if let Err(e) = store.remove_from_wal(entry) {
                    log::warn(dir, &format!("worker: wal remove failed: {e}"));
                }
            }
            Verdict::Failed(e) => {
                log::warn(dir, &format!("worker: classify failed, entry stays queued: {e}"));
            }
        }
    }
}
