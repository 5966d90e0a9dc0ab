//! Lock client configuration

use std::time::Duration;

use serde::Deserialize;

/// Retry settings for [`crate::LockClient`]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Pause between acquire attempts, in milliseconds
    pub retry_backoff_ms: u64,
    /// Cap on release retries after a transaction abort (`None` = retry until decided)
    pub release_max_retries: Option<u32>,
    /// Pause between release retries, in milliseconds
    pub release_retry_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 10,
            release_max_retries: None,
            release_retry_backoff_ms: 0,
        }
    }
}

impl LockConfig {
    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_release_max_retries(mut self, max_retries: u32) -> Self {
        self.release_max_retries = Some(max_retries);
        self
    }

    pub fn with_release_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.release_retry_backoff_ms = backoff_ms;
        self
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn release_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.release_retry_backoff_ms)
    }
}
