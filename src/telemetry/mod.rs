//! Telemetry for the rate-limit retry policy.
//!
//! The policy emits a [`RetryEvent`] for every attempt and for the way a call ends. Events flow
//! through [`TelemetrySink`] implementations, which are plain `tower::Service<RetryEvent>`s, so
//! sinks compose with ordinary tower combinators.
//!
//! ```rust
//! use sendgrid_retry::telemetry::{event_to_json, RetryEvent};
//! use std::time::Duration;
//!
//! let event = RetryEvent::RateLimited {
//!     call_id: "policy-1".into(),
//!     attempt: 1,
//!     delay: Duration::from_millis(500),
//!     remaining: Duration::from_secs(59),
//! };
//! assert_eq!(event_to_json(&event)["delay_ms"], 500);
//! ```

pub mod events;
pub mod sinks;

pub use events::{event_to_json, RetryEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
