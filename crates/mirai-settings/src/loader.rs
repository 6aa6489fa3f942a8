//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::MiraiSettings;

/// `~/.mirai`, or `/tmp/.mirai` when `HOME` is unset.
pub fn mirai_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mirai")
}

/// Resolve the path to the settings file (`~/.mirai/settings.json`).
pub fn settings_path() -> PathBuf {
    mirai_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MiraiSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MiraiSettings> {
    let mut settings = load_file_layer(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<MiraiSettings> {
    let defaults = serde_json::to_value(MiraiSettings::default())?;

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

/// Apply `MIRAI_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored, keeping the file/default value.
pub fn apply_overrides(settings: &mut MiraiSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── API ─────────────────────────────────────────────────────────
    if let Some(v) = string("MIRAI_API_URL") {
        settings.api.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = string("MIRAI_MODEL") {
        settings.api.model = Some(v);
    }
    if let Some(raw) = string("MIRAI_CONNECT_TIMEOUT_MS") {
        match parse_u64_range(&raw, 100, 600_000) {
            Some(v) => settings.api.connect_timeout_ms = v,
            None => warn!(key = "MIRAI_CONNECT_TIMEOUT_MS", value = %raw, "invalid u64 env var, ignoring"),
        }
    }

    // ── Draft cache ─────────────────────────────────────────────────
    if let Some(raw) = string("MIRAI_DRAFT_ENABLED") {
        match parse_bool(&raw) {
            Some(v) => settings.draft.enabled = v,
            None => warn!(key = "MIRAI_DRAFT_ENABLED", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = string("MIRAI_DRAFT_DB") {
        settings.draft.db_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("MIRAI_LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
    if let Some(raw) = string("MIRAI_LOG_JSON") {
        match parse_bool(&raw) {
            Some(v) => settings.logging.json = v,
            None => warn!(key = "MIRAI_LOG_JSON", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
