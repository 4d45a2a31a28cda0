//! Backoff between rate-limited attempts.
//!
//! Attempt semantics: attempt `0` is the initial call (no delay); the first retry is attempt `1`.
//! Delays saturate at [`MAX_BACKOFF`] and the retry policy additionally clamps every wait to the
//! time left before its deadline.
//!
//! ```rust
//! use std::time::Duration;
//! use sendgrid_retry::Backoff;
//!
//! let backoff = Backoff::linear(Duration::from_millis(500))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(500));
//! assert_eq!(backoff.delay(3), Duration::from_millis(1500));
//! assert_eq!(backoff.delay(10), Duration::from_secs(2));
//! ```

use std::fmt;
use std::time::Duration;

/// Upper bound on any computed delay; a rate-limit window never needs more.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Default first wait after a 429.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default ceiling for a single wait.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for linear backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackoffKind {
    Constant { delay: Duration },
    Linear { base: Duration, max: Option<Duration> },
}

/// Constant or capped-linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Default for Backoff {
    /// Linear from 500ms, capped at 10s.
    fn default() -> Self {
        Self {
            kind: BackoffKind::Linear { base: DEFAULT_BACKOFF_BASE, max: Some(DEFAULT_BACKOFF_MAX) },
        }
    }
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    pub fn linear(base: Duration) -> Self {
        Self { kind: BackoffKind::Linear { base, max: None } }
    }

    /// Cap a linear backoff. Errors on constant backoff, a zero cap, or a cap below the base.
    pub fn with_max(mut self, cap: Duration) -> Result<Self, BackoffError> {
        if cap.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Linear { base, max } => {
                if cap < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max: cap });
                }
                *max = Some(cap);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay before `attempt` (0 = initial call).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let raw = match self.kind {
            BackoffKind::Constant { delay } => delay,
            BackoffKind::Linear { base, max } => {
                let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
                let linear = base.checked_mul(factor).unwrap_or(MAX_BACKOFF);
                max.map_or(linear, |m| linear.min(m))
            }
        };
        raw.min(MAX_BACKOFF)
    }

    /// Delay before `attempt`, never longer than `remaining`.
    pub fn delay_within(&self, attempt: usize, remaining: Duration) -> Duration {
        self.delay(attempt).min(remaining)
    }
}
