//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ParleySettings;

/// Resolve the settings file path.
///
/// `PARLEY_SETTINGS_PATH` wins; otherwise `~/.parley/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string("PARLEY_SETTINGS_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid merged
/// result is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<ParleySettings> {
    let parse_error = |source| SettingsError::Parse {
        path: path.to_owned(),
        source,
    };
    let defaults = serde_json::to_value(ParleySettings::default()).map_err(parse_error)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_error)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(parse_error)
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

/// Apply environment overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_env_overrides<F>(settings: &mut ParleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // ── Entity settings ─────────────────────────────────────────────
    if let Some(v) = read_f64(&lookup, "PARLEY_DEFAULT_CONFIDENCE", 0.0, 1.0) {
        settings.entities.default_confidence = v;
    }
    if let Some(v) = read_f64(&lookup, "PARLEY_CONFIDENCE_THRESHOLD", 0.0, 1.0) {
        settings.entities.confidence_threshold = v;
    }
    if let Some(v) = read_bool(&lookup, "PARLEY_NORMALIZE_TRIM") {
        settings.entities.normalization.trim = v;
    }
    if let Some(v) = read_bool(&lookup, "PARLEY_NORMALIZE_LOWERCASE") {
        settings.entities.normalization.lowercase = v;
    }
    if let Some(v) = read_bool(&lookup, "PARLEY_NORMALIZE_STRIP_PUNCTUATION") {
        settings.entities.normalization.strip_punctuation = v;
    }

    // ── Context window ──────────────────────────────────────────────
    if let Some(v) = read_u32(&lookup, "PARLEY_MAX_TOKENS", 1, 10_000_000) {
        settings.context_window.max_tokens = v;
    }
    if let Some(v) = read_u32(&lookup, "PARLEY_SYSTEM_PROMPT_TOKENS", 0, 10_000_000) {
        settings.context_window.system_prompt_tokens = v;
    }
    if let Some(v) = read_u32(&lookup, "PARLEY_RESPONSE_RESERVED_TOKENS", 0, 10_000_000) {
        settings.context_window.response_reserved_tokens = v;
    }
    if let Some(v) = read_u32(&lookup, "PARLEY_SUMMARY_TOKENS", 0, 10_000_000) {
        settings.context_window.summary_tokens = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = lookup("PARLEY_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool(&lookup, "PARLEY_LOG_JSON") {
        settings.logging.json = v;
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

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<bool> {
    let val = lookup(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_u32<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, min: u32, max: u32) -> Option<u32> {
    let val = lookup(name)?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_f64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, min: f64, max: f64) -> Option<f64> {
    let val = lookup(name)?;
    let result = parse_f64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid float env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
