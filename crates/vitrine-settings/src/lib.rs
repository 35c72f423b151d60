//! # vitrine-settings
//!
//! Configuration for the Vitrine session state engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`VitrineSettings::default()`]
//! 2. **User file**: `~/.vitrine/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `VITRINE_*` overrides (highest priority)
//!
//! There is no global instance. Binaries load settings once at startup and
//! pass the relevant sections down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path, vitrine_home,
};
pub use types::{LoggingSettings, StoreSettings, VitrineSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = VitrineSettings::default();
        assert_eq!(settings.store.pool_size, 16);
        assert_eq!(settings.store.busy_timeout_ms, 30_000);
        assert_eq!(settings.store.max_step_retries, 5);
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_path_under_vitrine_home() {
        assert!(settings_path().starts_with(vitrine_home()));
        assert!(settings_path().ends_with("settings.json"));
    }
}
