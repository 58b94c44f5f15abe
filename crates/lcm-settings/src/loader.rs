//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LedgerSettings::default()`]
//! 2. If `~/.openclaw/lcm-ledger.json` exists, deep-merge user values over defaults
//! 3. Apply `LCM_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::LedgerSettings;

/// The agent runtime's data directory (`~/.openclaw`).
pub fn openclaw_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".openclaw")
}

/// Resolve the path to the settings file (`~/.openclaw/lcm-ledger.json`).
pub fn settings_path() -> PathBuf {
    openclaw_dir().join("lcm-ledger.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LedgerSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<LedgerSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<LedgerSettings> {
    let defaults = serde_json::to_value(LedgerSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut LedgerSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Recognized keys: `LCM_DB_PATH`, `LCM_LOG_LEVEL`, `LCM_BUSY_TIMEOUT_MS`
/// (1..=600000), `LCM_POOL_SIZE` (1..=64). Empty or out-of-range values are
/// ignored with a warning.
pub fn apply_overrides_from<F>(settings: &mut LedgerSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let read_u32 = |name: &str, min: u32, max: u32| {
        let val = lookup(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    };

    if let Some(v) = read_string("LCM_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = read_u32("LCM_BUSY_TIMEOUT_MS", 1, 600_000) {
        settings.database.busy_timeout_ms = v;
    }
    if let Some(v) = read_u32("LCM_POOL_SIZE", 1, 64) {
        settings.database.pool_size = v;
    }
    if let Some(v) = read_string("LCM_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
