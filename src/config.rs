use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";

fn default_classifier_model() -> String {
    "claude-3-5-haiku-latest".into()
}

fn default_synthesis_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_threshold() -> f64 {
    crate::model::ACTIVATION
}

fn default_max_learnings() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_classifier_model")]
    pub classifier_model: String,
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_learnings")]
    pub max_learnings: usize,
    #[serde(default)]
    pub paused: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            anthropic_api_key: None,
            classifier_model: default_classifier_model(),
            synthesis_model: default_synthesis_model(),
            confidence_threshold: default_threshold(),
            max_learnings: default_max_learnings(),
            paused: false,
        }
    }
}

impl EngineConfig {
    /// Env var wins over the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.anthropic_api_key.clone())
    }
}

/// Load config from `<dir>/config.json`. Missing or corrupt files fall back
/// to defaults: a hook must never fail because of configuration.
pub fn load_config(dir: &Path) -> EngineConfig {
    let path = dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                crate::log::warn(dir, &format!("config parse failed, using defaults: {e}"));
                EngineConfig::default()
            }
        },
        Err(_) => EngineConfig::default(),
    }
}

/// Resolve the state directory: explicit flag, then OPENTELL_DIR, then
/// ~/.opentell.
pub fn state_dir(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    if let Ok(dir) = std::env::var("OPENTELL_DIR")
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".opentell")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(dir.path());
        assert_eq!(config.confidence_threshold, 0.45);
        assert_eq!(config.max_learnings, 100);
        assert!(!config.paused);
        assert!(config.classifier_model.contains("haiku"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"confidence_threshold": 0.5, "paused": true}"#,
        )
        .unwrap();
        let config = load_config(dir.path());
        assert_eq!(config.confidence_threshold, 0.5);
        assert!(config.paused);
        assert_eq!(config.max_learnings, 100);
    }

    #[test]
    fn corrupt_file_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let config = load_config(dir.path());
        assert_eq!(config.max_learnings, 100);
    }

    #[test]
    fn state_dir_flag_wins() {
        let dir = state_dir(Some(PathBuf::from("/tmp/custom")));
        assert_eq!(dir, PathBuf::from("/tmp/custom"));
    }
}
