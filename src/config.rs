//! Serializable retry settings.
//!
//! Durations are plain milliseconds so the settings can live in any config file format.
//!
//! ```rust
//! use sendgrid_retry::{RateLimitRetry, RetryConfig};
//! use std::time::Duration;
//!
//! let config: RetryConfig =
//!     serde_json::from_str(r#"{"timeout_ms": 30000, "backoff_base_ms": 250}"#).unwrap();
//! let policy = RateLimitRetry::from_config(&config).unwrap();
//! assert_eq!(policy.default_timeout(), Duration::from_secs(30));
//! ```

use crate::backoff::{Backoff, BackoffError, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};
use crate::retry::DEFAULT_RETRY_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    Constant,
    #[default]
    Linear,
}

/// Retry policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry budget used when the caller's timeout source has none.
    pub timeout_ms: u64,
    pub backoff: BackoffMode,
    pub backoff_base_ms: u64,
    /// Cap for linear backoff; ignored for constant backoff.
    pub backoff_max_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: millis(DEFAULT_RETRY_TIMEOUT),
            backoff: BackoffMode::Linear,
            backoff_base_ms: millis(DEFAULT_BACKOFF_BASE),
            backoff_max_ms: Some(millis(DEFAULT_BACKOFF_MAX)),
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn to_backoff(&self) -> Result<Backoff, BackoffError> {
        let base = Duration::from_millis(self.backoff_base_ms);
        match (self.backoff, self.backoff_max_ms) {
            (BackoffMode::Constant, _) => Ok(Backoff::constant(base)),
            (BackoffMode::Linear, None) => Ok(Backoff::linear(base)),
            (BackoffMode::Linear, Some(max)) => {
                Backoff::linear(base).with_max(Duration::from_millis(max))
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.timeout(), DEFAULT_RETRY_TIMEOUT);
        assert_eq!(config.to_backoff().unwrap(), Backoff::default());
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"backoff": "constant", "backoff_base_ms": 2000}"#).unwrap();
        assert_eq!(config.timeout_ms, 60_000);
        assert_eq!(config.to_backoff().unwrap(), Backoff::constant(Duration::from_secs(2)));
    }

    #[test]
    fn invalid_cap_is_reported() {
        let config = RetryConfig {
            backoff_base_ms: 5_000,
            backoff_max_ms: Some(1_000),
            ..RetryConfig::default()
        };
        assert!(matches!(config.to_backoff(), Err(BackoffError::MaxLessThanBase { .. })));
    }
}
