use std::time::Duration;

use vitrine_settings::StoreSettings;

/// Write-path tuning for [`StateStore`](super::StateStore).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Attempts at a contended write before surfacing a conflict.
    pub max_step_retries: u32,
    /// Backoff unit; attempt `n` sleeps `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_step_retries: 5,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

impl From<&StoreSettings> for StoreOptions {
    fn from(s: &StoreSettings) -> Self {
        Self {
            max_step_retries: s.max_step_retries,
            retry_backoff: Duration::from_millis(s.retry_backoff_ms),
        }
    }
}
