//! Settings type definitions.
//!
//! Field names are camelCase on the wire. Every section implements
//! [`Default`] with production values and is `#[serde(default)]`, so a
//! partial JSON file only needs the keys it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitrineSettings {
    /// State store settings.
    pub store: StoreSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl VitrineSettings {
    /// Reject values the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.store.validate()
    }
}

/// SQLite-backed state store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file. Relative paths resolve under `~/.vitrine`.
    pub db_path: String,
    /// Connections in a file-backed pool.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Page cache size in KiB.
    pub cache_size_kib: u64,
    /// Attempts at a contended step allocation before giving up.
    pub max_step_retries: u32,
    /// Linear backoff unit between step allocation attempts.
    pub retry_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "state.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
            max_step_retries: 5,
            retry_backoff_ms: 10,
        }
    }
}

impl StoreSettings {
    /// Database path, resolving relative paths against `home`.
    pub fn resolve_db_path(&self, home: &Path) -> PathBuf {
        let path = Path::new(&self.db_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            home.join(path)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.is_empty() {
            return Err(SettingsError::InvalidValue("store.dbPath must not be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(SettingsError::InvalidValue("store.poolSize must be at least 1".into()));
        }
        if self.max_step_retries == 0 {
            return Err(SettingsError::InvalidValue(
                "store.maxStepRetries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive (`RUST_LOG` wins when set).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
