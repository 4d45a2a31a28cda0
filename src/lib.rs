#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # sendgrid-retry
//!
//! Rate-limit retries and error classification for SendGrid v3 API calls.
//!
//! ## Features
//!
//! - **Rate-limit retry policy** that retries HTTP 429 within a caller-governed deadline and
//!   aborts promptly on cancellation
//! - **Error taxonomy** that turns status codes and API messages into actionable errors
//! - **Opaque API error** payloads that render a readable detail whatever shape the API returned
//! - **Thin client** over a pluggable [`Transport`], with sentinel validation errors
//! - **Telemetry** events delivered to `tower::Service` sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use sendgrid_retry::{retry_on_rate_limit, CallContext, RequestError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = CallContext::with_timeout(Duration::from_secs(30));
//!     let result = retry_on_rate_limit(&ctx, &Duration::from_secs(20), || async {
//!         // Issue the request here.
//!         Ok::<_, RequestError>("202 Accepted")
//!     })
//!     .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod api_error;
pub mod backoff;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod retry;
pub mod sleeper;
pub mod taxonomy;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use api_error::{ApiError, Payload};
pub use backoff::{Backoff, BackoffError};
pub use client::{body_to_json, Client, ClientConfig};
pub use config::{BackoffMode, RetryConfig};
pub use context::{
    CallContext, CancelHandle, CrudOperation, ResourceScope, ResourceTimeouts, TimeoutSource,
};
pub use error::{ApiFailure, BoxError, ClientError, RequestError, RetryError, STATUS_NONE};
pub use retry::{
    retry_on_rate_limit, BuildError, RateLimitRetry, RateLimitRetryBuilder, DEFAULT_RETRY_TIMEOUT,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use taxonomy::{classify_message, enhance_error, ClassifiedError, MessageClass, StatusClass};
pub use telemetry::{LogSink, MemorySink, NullSink, RetryEvent, TelemetrySink};
pub use transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};
