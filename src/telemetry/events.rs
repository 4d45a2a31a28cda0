use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Events emitted by the rate-limit retry policy.
///
/// Every event carries the `call_id` supplied by the caller's timeout source so that events from
/// concurrent calls can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// The operation is about to be invoked.
    Attempt {
        call_id: String,
        /// 1-indexed.
        attempt: usize,
    },
    /// A 429 came back and the policy will wait before trying again.
    RateLimited {
        call_id: String,
        attempt: usize,
        delay: Duration,
        remaining: Duration,
    },
    /// The operation succeeded.
    Succeeded { call_id: String, attempts: usize, elapsed: Duration },
    /// A non-retryable failure ended the call.
    Rejected { call_id: String, attempts: usize, status_code: u16 },
    /// Still rate limited when the retry deadline ran out.
    DeadlineExhausted { call_id: String, attempts: usize, elapsed: Duration },
    /// The call context was cancelled during a backoff wait.
    Cancelled { call_id: String, attempts: usize },
}

impl RetryEvent {
    pub fn call_id(&self) -> &str {
        match self {
            RetryEvent::Attempt { call_id, .. }
            | RetryEvent::RateLimited { call_id, .. }
            | RetryEvent::Succeeded { call_id, .. }
            | RetryEvent::Rejected { call_id, .. }
            | RetryEvent::DeadlineExhausted { call_id, .. }
            | RetryEvent::Cancelled { call_id, .. } => call_id,
        }
    }

    /// Whether this event ends the call.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryEvent::Attempt { .. } | RetryEvent::RateLimited { .. })
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { call_id, attempt } => {
                write!(f, "Attempt(id={}, #{})", call_id, attempt)
            }
            RetryEvent::RateLimited { call_id, attempt, delay, remaining } => write!(
                f,
                "RateLimited(id={}, #{}, delay={:?}, remaining={:?})",
                call_id, attempt, delay, remaining
            ),
            RetryEvent::Succeeded { call_id, attempts, elapsed } => {
                write!(f, "Succeeded(id={}, attempts={}, elapsed={:?})", call_id, attempts, elapsed)
            }
            RetryEvent::Rejected { call_id, attempts, status_code } => write!(
                f,
                "Rejected(id={}, attempts={}, status={})",
                call_id, attempts, status_code
            ),
            RetryEvent::DeadlineExhausted { call_id, attempts, elapsed } => write!(
                f,
                "DeadlineExhausted(id={}, attempts={}, elapsed={:?})",
                call_id, attempts, elapsed
            ),
            RetryEvent::Cancelled { call_id, attempts } => {
                write!(f, "Cancelled(id={}, attempts={})", call_id, attempts)
            }
        }
    }
}

#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Convert an event into a JSON value for structured sinks.
pub fn event_to_json(event: &RetryEvent) -> serde_json::Value {
    match event {
        RetryEvent::Attempt { call_id, attempt } => json!({
            "kind": "attempt",
            "call_id": call_id,
            "attempt": *attempt,
        }),
        RetryEvent::RateLimited { call_id, attempt, delay, remaining } => json!({
            "kind": "rate_limited",
            "call_id": call_id,
            "attempt": *attempt,
            "delay_ms": clamp_u64(delay.as_millis()),
            "remaining_ms": clamp_u64(remaining.as_millis()),
        }),
        RetryEvent::Succeeded { call_id, attempts, elapsed } => json!({
            "kind": "succeeded",
            "call_id": call_id,
            "attempts": *attempts,
            "elapsed_ms": clamp_u64(elapsed.as_millis()),
        }),
        RetryEvent::Rejected { call_id, attempts, status_code } => json!({
            "kind": "rejected",
            "call_id": call_id,
            "attempts": *attempts,
            "status": *status_code,
        }),
        RetryEvent::DeadlineExhausted { call_id, attempts, elapsed } => json!({
            "kind": "deadline_exhausted",
            "call_id": call_id,
            "attempts": *attempts,
            "elapsed_ms": clamp_u64(elapsed.as_millis()),
        }),
        RetryEvent::Cancelled { call_id, attempts } => json!({
            "kind": "cancelled",
            "call_id": call_id,
            "attempts": *attempts,
        }),
    }
}
