//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`VitrineSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `VITRINE_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::VitrineSettings;

/// `~/.vitrine` (falls back to `/tmp/.vitrine` without `HOME`).
pub fn vitrine_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".vitrine")
}

/// `~/.vitrine/settings.json`.
pub fn settings_path() -> PathBuf {
    vitrine_home().join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<VitrineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<VitrineSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<VitrineSettings> {
    let defaults = serde_json::to_value(VitrineSettings::default())?;

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

/// Apply `VITRINE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut VitrineSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `VITRINE_*` overrides from an arbitrary lookup.
///
/// Invalid or out-of-range values are logged and ignored, keeping the
/// file/default value.
pub fn apply_overrides_from(
    settings: &mut VitrineSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = read_string(&lookup, "VITRINE_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = read_u32(&lookup, "VITRINE_POOL_SIZE", 1, 256) {
        settings.store.pool_size = v;
    }
    if let Some(v) = read_u64(&lookup, "VITRINE_BUSY_TIMEOUT_MS", 0, 600_000) {
        settings.store.busy_timeout_ms = v;
    }
    if let Some(v) = read_u32(&lookup, "VITRINE_MAX_STEP_RETRIES", 1, 100) {
        settings.store.max_step_retries = v;
    }
    if let Some(v) = read_u64(&lookup, "VITRINE_RETRY_BACKOFF_MS", 0, 10_000) {
        settings.store.retry_backoff_ms = v;
    }
    if let Some(v) = read_string(&lookup, "VITRINE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Readers ─────────────────────────────────────────────────────────────────

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: u32,
    max: u32,
) -> Option<u32> {
    let val = lookup(name)?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tracing::Level;
    use vitrine_core::logging::capture_logs;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"store": {"poolSize": 16, "dbPath": "state.db"}});
        let source = serde_json::json!({"store": {"poolSize": 2}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["store"]["poolSize"], 2);
        assert_eq!(merged["store"]["dbPath"], "state.db");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, VitrineSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"store": {"poolSize": 4, "retryBackoffMs": 25}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.store.pool_size, 4);
        assert_eq!(settings.store.retry_backoff_ms, 25);
        assert_eq!(settings.store.busy_timeout_ms, 30_000);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"store": {"poolSize": "many"}}"#).unwrap();

        assert!(matches!(
            read_file_layer(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_out_of_range_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"store": {"maxStepRetries": 0}}"#).unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert!(matches!(
            settings.validate().unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = VitrineSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("VITRINE_DB_PATH", "/data/vitrine.db"),
                ("VITRINE_POOL_SIZE", "8"),
                ("VITRINE_BUSY_TIMEOUT_MS", "5000"),
                ("VITRINE_MAX_STEP_RETRIES", "3"),
                ("VITRINE_RETRY_BACKOFF_MS", "0"),
                ("VITRINE_LOG_LEVEL", "vitrine_state=debug"),
            ]),
        );

        assert_eq!(settings.store.db_path, "/data/vitrine.db");
        assert_eq!(settings.store.pool_size, 8);
        assert_eq!(settings.store.busy_timeout_ms, 5000);
        assert_eq!(settings.store.max_step_retries, 3);
        assert_eq!(settings.store.retry_backoff_ms, 0);
        assert_eq!(settings.logging.level, "vitrine_state=debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = VitrineSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("VITRINE_POOL_SIZE", "0"),
                ("VITRINE_MAX_STEP_RETRIES", "lots"),
                ("VITRINE_DB_PATH", ""),
            ]),
        );
        assert_eq!(settings, VitrineSettings::default());
    }

    #[test]
    fn invalid_env_value_logs_warning() {
        let (logs, _guard) = capture_logs();
        let mut settings = VitrineSettings::default();
        apply_overrides_from(&mut settings, env(&[("VITRINE_POOL_SIZE", "9999")]));
        assert!(logs.has_event(Level::WARN, "invalid u32 env var"));
        assert!(logs.has_field("key", "VITRINE_POOL_SIZE"));
    }

    // ── parse_*_range ───────────────────────────────────────────────

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("1", 1, 256), Some(1));
        assert_eq!(parse_u32_range("256", 1, 256), Some(256));
        assert_eq!(parse_u32_range("0", 1, 256), None);
        assert_eq!(parse_u32_range(" 12 ", 1, 256), Some(12));
        assert_eq!(parse_u32_range("-1", 1, 256), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 0, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("700000", 0, 600_000), None);
        assert_eq!(parse_u64_range("abc", 0, 600_000), None);
    }
}
