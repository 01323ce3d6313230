//! Store and logging settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// SQLite database file. Relative paths resolve under `~/.engage`.
    pub db_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "engage.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name case-insensitively.
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"engage_store": "warn"}`.
    pub module_levels: BTreeMap<String, LogLevel>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
