//! Structured JSON-lines logging.
//!
//! One JSON object per line on stderr, with a UTC timestamp and free-form
//! fields. Level comes from the LOG_LEVEL env var (default info).

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("debug") => Level::Debug,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

fn min_level() -> Level {
    static MIN: OnceLock<Level> = OnceLock::new();
    *MIN.get_or_init(Level::from_env)
}

/// Emit one structured log line. Fields merge into the envelope.
pub fn json_log(level: Level, event: &str, fields: Value) {
    if level < min_level() {
        return;
    }
    let mut obj = Map::new();
    obj.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
    obj.insert("level".to_string(), json!(level.as_str()));
    obj.insert("event".to_string(), json!(event));
    if let Value::Object(extra) = fields {
        for (k, v) in extra {
            obj.insert(k, v);
        }
    }
    eprintln!("{}", Value::Object(obj));
}
