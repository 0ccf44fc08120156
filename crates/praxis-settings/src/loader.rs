//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PraxisSettings::default()`]
//! 2. If `~/.praxis/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PRAXIS_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{DEFAULT_REALTIME_ENDPOINT, PraxisSettings};

/// Env var naming the realtime endpoint. Its absence is a warning
/// condition, not a fatal one.
pub const REALTIME_URL_VAR: &str = "PRAXIS_REALTIME_URL";

/// Resolve the path to the settings file (`~/.praxis/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".praxis").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PraxisSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<PraxisSettings> {
    let defaults = serde_json::to_value(PraxisSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PraxisSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);

    if std::env::var(REALTIME_URL_VAR).is_err()
        && settings.realtime.endpoint == DEFAULT_REALTIME_ENDPOINT
    {
        warn!(
            var = REALTIME_URL_VAR,
            fallback = DEFAULT_REALTIME_ENDPOINT,
            "realtime endpoint not configured, using default"
        );
    }

    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut PraxisSettings) {
    if let Some(v) = read_env_string(REALTIME_URL_VAR) {
        settings.realtime.endpoint = v;
    }
    if let Some(v) = read_env_u64("PRAXIS_HANDSHAKE_TIMEOUT_MS", 100, 120_000) {
        settings.realtime.handshake_timeout_ms = v;
    }
    if let Some(v) = read_env_string("PRAXIS_API_BASE_URL") {
        settings.notifications.api_base_url = v;
    }
    if let Some(v) = read_env_u64("PRAXIS_LIST_INTERVAL_MS", 1000, 3_600_000) {
        settings.notifications.list_interval_ms = v;
    }
    if let Some(v) = read_env_u64("PRAXIS_COUNT_INTERVAL_MS", 1000, 3_600_000) {
        settings.notifications.count_interval_ms = v;
    }
    if let Some(v) = read_env_string("PRAXIS_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
