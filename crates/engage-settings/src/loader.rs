//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngageSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ENGAGE_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{EngageSettings, LogLevel};

/// `~/.engage`, falling back to `/tmp/.engage` without `HOME`.
pub fn engage_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".engage")
}

/// Resolve the path to the settings file (`~/.engage/settings.json`).
pub fn settings_path() -> PathBuf {
    engage_home().join("settings.json")
}

/// Resolve `store.dbPath`, anchoring relative paths under [`engage_home`].
pub fn resolve_db_path(settings: &EngageSettings) -> PathBuf {
    let path = Path::new(&settings.store.db_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        engage_home().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngageSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// [`EngageSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<EngageSettings> {
    let defaults = serde_json::to_value(EngageSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EngageSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ENGAGE_*` environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut EngageSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and leave the file/default
/// value in place.
pub fn apply_overrides_with<F>(settings: &mut EngageSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("ENGAGE_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = env.u32_range("ENGAGE_POOL_SIZE", 1, 64) {
        settings.store.pool_size = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ENGAGE_LOG_LEVEL") {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = level,
            None => warn!(key = "ENGAGE_LOG_LEVEL", value = %v, "invalid log level env var, ignoring"),
        }
    }
    if let Some(v) = env.bool("ENGAGE_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Read tracking ───────────────────────────────────────────────
    if let Some(v) = env.bool("ENGAGE_TRACK_READ_POSTS") {
        settings.read_tracking.enabled = v;
    }
    if let Some(v) = env.bool("ENGAGE_ALLOW_FORCED_TRACKING") {
        settings.read_tracking.allow_forced = v;
    }
    if let Some(v) = env.i64_range("ENGAGE_OLD_POST_DAYS", 0, 3650) {
        settings.read_tracking.old_post_days = v;
    }

    // ── Rating / mail ───────────────────────────────────────────────
    if let Some(v) = env.bool("ENGAGE_ALLOW_RATING_CHANGE") {
        settings.rating.allow_rating_change = v;
    }
    if let Some(v) = env.i64_range("ENGAGE_MAX_EDITING_TIME", 0, 31_536_000) {
        settings.rating.max_editing_time_secs = v;
    }
    if let Some(v) = env.i64_range("ENGAGE_MAX_MAILING_HOURS", 1, 8760) {
        settings.mail.max_mailing_time_hours = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `i64` within a range.
pub fn parse_i64_range(val: &str, min: i64, max: i64) -> Option<i64> {
    let n: i64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u32_range(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn i64_range(&self, name: &str, min: i64, max: i64) -> Option<i64> {
        let val = (self.lookup)(name)?;
        let result = parse_i64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid i64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
