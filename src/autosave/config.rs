use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{SyncError, SyncResult};

/// Tuning for the autosave runtime.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// debounce_ms = 3000
/// max_retries = 0
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a save fires
    pub debounce_ms: u64,
    /// Upper bound on an exit flush request
    pub flush_timeout_ms: u64,
    /// Automatic retries after a transient save failure; 0 disables retrying
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Capacity of the host command channel
    pub command_buffer: usize,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 10_000,
            flush_timeout_ms: 5_000,
            max_retries: 3,
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 60_000,
            command_buffer: 1000,
        }
    }
}

impl AutosaveConfig {
    pub fn from_toml_str(raw: &str) -> SyncResult<Self> {
        let config: AutosaveConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.debounce_ms == 0 {
            return Err(SyncError::config("debounce_ms must be greater than zero"));
        }
        if self.flush_timeout_ms == 0 {
            return Err(SyncError::config("flush_timeout_ms must be greater than zero"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(SyncError::config(
                "retry_base_delay_ms must not exceed retry_max_delay_ms",
            ));
        }
        if self.command_buffer == 0 {
            return Err(SyncError::config("command_buffer must be greater than zero"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn save_policy(&self) -> SavePolicy {
        SavePolicy {
            debounce: self.debounce(),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Timing rules the coordinator applies to one project session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SavePolicy {
    pub debounce: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl SavePolicy {
    /// Delay before retry number `attempt` (1-based): exponential, capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.retry_max_delay)
    }
}
