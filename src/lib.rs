pub mod analyzer;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod consolidate;
pub mod context;
pub mod hooks;
pub mod log;
pub mod model;
pub mod observer;
pub mod patterns;
pub mod profile;
pub mod promote;
pub mod prompts;
pub mod stats;
pub mod store;
pub mod text;
pub mod tool_signals;
pub mod transcript;
pub mod update;
pub mod worker;

#[derive(Debug)]
pub enum OpentellError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Http(String),
    Config(String),
}

impl std::fmt::Display for OpentellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpentellError::Io(e) => write!(f, "io: {e}"),
            OpentellError::Json(e) => write!(f, "json: {e}"),
            OpentellError::Http(msg) => write!(f, "http: {msg}"),
            OpentellError::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl From<std::io::Error> for OpentellError {
    fn from(e: std::io::Error) -> Self {
        OpentellError::Io(e)
    }
}

impl From<serde_json::Error> for OpentellError {
    fn from(e: serde_json::Error) -> Self {
        OpentellError::Json(e)
    }
}

/// Current unix timestamp in seconds.
pub fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
