//! Self-update check: a detached, 24h-throttled version probe. Informational
//! only — installation is the installer's job, this just tells the developer
//! a newer release exists.

use crate::log;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

const RELEASE_URL: &str = "https://api.github.com/repos/opentell/opentell/releases/latest";
const FETCH_TIMEOUT_SECS: u64 = 15;
const CHECK_INTERVAL_SECS: u64 = 24 * 60 * 60;
const STAMP_FILE: &str = "update-check";

fn stamp_fresh(dir: &Path) -> bool {
    let stamp = dir.join(STAMP_FILE);
    match std::fs::metadata(&stamp).and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age.as_secs() < CHECK_INTERVAL_SECS)
            .unwrap_or(true),
        Err(_) => false,
    }
}

fn touch_stamp(dir: &Path) {
    let _ = std::fs::write(dir.join(STAMP_FILE), crate::now_ts().to_string());
}

/// From session-start: at most one detached check per 24 hours.
pub fn maybe_spawn_check(dir: &Path) {
    if stamp_fresh(dir) {
        return;
    }
    touch_stamp(dir);

    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(_) => return,
    };
    let _ = Command::new(exe)
        .arg("update")
        .arg("--dir")
        .arg(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
}

/// Compare dotted versions; true when `remote` is newer.
fn is_newer(remote: &str, local: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split('.')
            .map(|p| p.trim().parse().unwrap_or(0))
            .collect()
    };
    let (r, l) = (parse(remote), parse(local));
    for i in 0..r.len().max(l.len()) {
        let rv = r.get(i).copied().unwrap_or(0);
        let lv = l.get(i).copied().unwrap_or(0);
        if rv != lv {
            return rv > lv;
        }
    }
    false
}

/// Foreground check body (also the detached child's body).
pub fn run_check(dir: &Path) {
    let agent = ureq::Agent::new_with_config(
        ureq::config::Config::builder()
            .timeout_global(Some(Duration::from_secs(FETCH_TIMEOUT_SECS)))
            .build(),
    );

    let resp: Result<serde_json::Value, _> = agent
        .get(RELEASE_URL)
        .header("user-agent", concat!("opentell/", env!("CARGO_PKG_VERSION")))
        .call()
        .and_then(|mut r| r.body_mut().read_json());

    match resp {
        Ok(body) => {
            let remote = body
                .get("tag_name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let local = env!("CARGO_PKG_VERSION");
            if !remote.is_empty() && is_newer(&remote, local) {
                log::info(
                    dir,
                    &format!("update available: {remote} (running {local})"),
                );
            }
        }
        Err(e) => log::warn(dir, &format!("update check failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison() {
        assert!(is_newer("0.5.0", "0.4.1"));
        assert!(is_newer("v1.0.0", "0.9.9"));
        assert!(is_newer("0.4.2", "0.4.1"));
        assert!(!is_newer("0.4.1", "0.4.1"));
        assert!(!is_newer("0.4.0", "0.4.1"));
        assert!(is_newer("0.4.1.1", "0.4.1"));
    }

    #[test]
    fn stamp_throttles_within_window() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!stamp_fresh(dir.path()));
        touch_stamp(dir.path());
        assert!(stamp_fresh(dir.path()));
    }
}
