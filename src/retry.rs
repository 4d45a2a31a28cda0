//! Rate-limit retry policy.
//!
//! Semantics:
//! - Only failures carrying HTTP 429 are retried. Every other failure, including 5xx responses and
//!   transport errors reported with [`STATUS_NONE`](crate::STATUS_NONE), ends the call on first
//!   occurrence.
//! - The retry deadline is the earlier of the call context's deadline and `start + budget`, where the
//!   budget comes from the caller's [`TimeoutSource`] or falls back to the policy default.
//! - Each wait is clamped to the time left before the deadline. A 429 observed once the deadline has
//!   passed returns [`RetryError::DeadlineExhausted`] instead of waiting again.
//! - Cancelling the call context during a wait aborts the call with [`RetryError::Cancelled`].
//!
//! Invariants:
//! - The operation is never invoked again after a success or a non-429 failure.
//! - Total time spent waiting never exceeds the deadline.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use sendgrid_retry::{CallContext, RateLimitRetry, RequestError, TrackingSleeper};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let sleeper = TrackingSleeper::new();
//! let policy = RateLimitRetry::builder().with_sleeper(sleeper.clone()).build().unwrap();
//!
//! let mut calls = 0;
//! let result = policy
//!     .execute(&CallContext::background(), &Duration::from_secs(30), || {
//!         calls += 1;
//!         let n = calls;
//!         async move {
//!             if n < 3 {
//!                 Err(RequestError::new(429, "too many requests"))
//!             } else {
//!                 Ok("sent")
//!             }
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(result.unwrap(), "sent");
//! assert_eq!(sleeper.calls().len(), 2);
//! # });
//! ```

use crate::backoff::{Backoff, BackoffError};
use crate::config::RetryConfig;
use crate::context::{CallContext, TimeoutSource};
use crate::error::{RequestError, RetryError};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{emit_best_effort, RetryEvent, TelemetrySink};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Retry budget used when the caller's timeout source does not supply one.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(60);

type Emitter = Arc<dyn Fn(RetryEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Retries an operation while it keeps failing with HTTP 429.
#[derive(Clone)]
pub struct RateLimitRetry {
    default_timeout: Duration,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    emitter: Option<Emitter>,
}

impl std::fmt::Debug for RateLimitRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitRetry")
            .field("default_timeout", &self.default_timeout)
            .field("backoff", &self.backoff)
            .field("sleeper", &self.sleeper)
            .field("sink", &self.emitter.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl Default for RateLimitRetry {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_RETRY_TIMEOUT,
            backoff: Backoff::default(),
            sleeper: Arc::new(TokioSleeper),
            emitter: None,
        }
    }
}

impl RateLimitRetry {
    pub fn builder() -> RateLimitRetryBuilder {
        RateLimitRetryBuilder::new()
    }

    /// Build a policy from serialized settings, using the tokio timer.
    pub fn from_config(config: &RetryConfig) -> Result<Self, BuildError> {
        let backoff = config.to_backoff()?;
        Self::builder().default_timeout(config.timeout()).backoff(backoff).build()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run `operation` until it succeeds, fails with anything but 429, the deadline runs out, or
    /// `ctx` is cancelled during a wait.
    pub async fn execute<T, Fut, Op, S>(
        &self,
        ctx: &CallContext,
        source: &S,
        mut operation: Op,
    ) -> Result<T, RetryError>
    where
        S: TimeoutSource + ?Sized,
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let call_id = source.call_id();
        let start = Instant::now();
        let budget = source.retry_timeout().unwrap_or(self.default_timeout);
        let deadline = [start.checked_add(budget), ctx.deadline()].into_iter().flatten().min();

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            tracing::debug!(call_id, attempt, "invoking operation");
            self.emit(|| RetryEvent::Attempt { call_id: call_id.to_string(), attempt }).await;

            let err = match operation().await {
                Ok(value) => {
                    let elapsed = start.elapsed();
                    tracing::debug!(call_id, attempts = attempt, ?elapsed, "call succeeded");
                    self.emit(|| RetryEvent::Succeeded {
                        call_id: call_id.to_string(),
                        attempts: attempt,
                        elapsed,
                    })
                    .await;
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_rate_limited() {
                let status_code = err.status_code();
                tracing::debug!(call_id, attempt, status_code, error = %err, "call failed, not retrying");
                self.emit(|| RetryEvent::Rejected {
                    call_id: call_id.to_string(),
                    attempts: attempt,
                    status_code,
                })
                .await;
                return Err(RetryError::Rejected { attempts: attempt, last: err.classify() });
            }

            let remaining =
                deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()));
            if remaining.is_zero() {
                let elapsed = start.elapsed();
                tracing::info!(call_id, attempts = attempt, ?elapsed, "still rate limited at deadline");
                self.emit(|| RetryEvent::DeadlineExhausted {
                    call_id: call_id.to_string(),
                    attempts: attempt,
                    elapsed,
                })
                .await;
                return Err(RetryError::DeadlineExhausted {
                    attempts: attempt,
                    elapsed,
                    last: err.classify(),
                });
            }

            let delay = self.backoff.delay_within(attempt, remaining);
            tracing::warn!(call_id, attempt, ?delay, ?remaining, "rate limited, backing off");
            self.emit(|| RetryEvent::RateLimited {
                call_id: call_id.to_string(),
                attempt,
                delay,
                remaining,
            })
            .await;

            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    tracing::info!(call_id, attempts = attempt, "retry cancelled");
                    self.emit(|| RetryEvent::Cancelled {
                        call_id: call_id.to_string(),
                        attempts: attempt,
                    })
                    .await;
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    async fn emit(&self, event: impl FnOnce() -> RetryEvent) {
        if let Some(emitter) = &self.emitter {
            emitter(event()).await;
        }
    }
}

/// Run `operation` under the default policy: 60s budget, capped-linear backoff, tokio timer.
pub async fn retry_on_rate_limit<T, Fut, Op, S>(
    ctx: &CallContext,
    source: &S,
    operation: Op,
) -> Result<T, RetryError>
where
    S: TimeoutSource + ?Sized,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    RateLimitRetry::default().execute(ctx, source, operation).await
}

/// Builder for [`RateLimitRetry`].
pub struct RateLimitRetryBuilder {
    default_timeout: Duration,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    emitter: Option<Emitter>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A first wait of zero would hammer the API until the deadline.
    ZeroBackoff,
    /// Backoff settings were inconsistent.
    Backoff(BackoffError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ZeroBackoff => write!(f, "backoff must wait longer than zero"),
            BuildError::Backoff(e) => write!(f, "invalid backoff: {}", e),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Backoff(e) => Some(e),
            BuildError::ZeroBackoff => None,
        }
    }
}

impl From<BackoffError> for BuildError {
    fn from(e: BackoffError) -> Self {
        BuildError::Backoff(e)
    }
}

impl RateLimitRetryBuilder {
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_RETRY_TIMEOUT,
            backoff: Backoff::default(),
            sleeper: Arc::new(TokioSleeper),
            emitter: None,
        }
    }

    /// Budget used when the timeout source has none. Zero means a 429 is returned without retrying.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Send every retry event to `sink`. Sink failures are ignored.
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        let emitter: Emitter = Arc::new(move |event| -> BoxFuture<'static, ()> {
            Box::pin(emit_best_effort(sink.clone(), event))
        });
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> Result<RateLimitRetry, BuildError> {
        if self.backoff.delay(1).is_zero() {
            return Err(BuildError::ZeroBackoff);
        }
        Ok(RateLimitRetry {
            default_timeout: self.default_timeout,
            backoff: self.backoff,
            sleeper: self.sleeper,
            emitter: self.emitter,
        })
    }
}

impl Default for RateLimitRetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::sleeper::{InstantSleeper, TrackingSleeper};
    use crate::telemetry::MemorySink;
    use crate::transport::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rate_limited() -> RequestError {
        RequestError::new(429, "too many requests")
    }

    fn policy(sleeper: TrackingSleeper) -> RateLimitRetry {
        RateLimitRetry::builder()
            .backoff(Backoff::constant(Duration::from_millis(100)))
            .with_sleeper(sleeper)
            .build()
            .expect("builder")
    }

    #[tokio::test]
    async fn success_first_attempt_does_not_sleep() {
        let sleeper = TrackingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy(sleeper.clone())
            .execute(&CallContext::background(), &Duration::from_secs(5), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, RequestError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn retries_429_until_success() {
        let sleeper = TrackingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = RateLimitRetry::builder()
            .backoff(Backoff::linear(Duration::from_millis(100)))
            .with_sleeper(sleeper.clone())
            .build()
            .unwrap()
            .execute(&CallContext::background(), &Duration::from_secs(30), || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(rate_limited())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(300)]
        );
    }

    #[tokio::test]
    async fn client_error_is_returned_after_one_attempt() {
        let sleeper = TrackingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let err = policy(sleeper.clone())
            .execute(&CallContext::background(), &Duration::from_secs(30), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RequestError::new(400, "invalid email address"))
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_rejected());
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.status_code(), Some(400));
        assert!(err.to_string().contains("invalid email address"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_not_retried() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let err = policy(TrackingSleeper::new())
            .execute(&CallContext::background(), &Duration::from_secs(30), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RequestError::new(503, "unavailable"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(err.status_code(), Some(503));
        assert!(err.to_string().starts_with("server error (HTTP 503)"));
    }

    #[tokio::test]
    async fn transport_and_validation_failures_are_not_retried() {
        let transport = policy(TrackingSleeper::new())
            .execute(&CallContext::background(), &Duration::from_secs(30), || async {
                Err::<(), _>(RequestError::transport(TransportError::new("connection reset")))
            })
            .await
            .unwrap_err();
        assert_eq!(transport.status_code(), Some(crate::STATUS_NONE));
        assert_eq!(transport.attempts(), 1);

        let invalid = policy(TrackingSleeper::new())
            .execute(&CallContext::background(), &Duration::from_secs(30), || async {
                Err::<(), _>(RequestError::invalid(ClientError::NameRequired))
            })
            .await
            .unwrap_err();
        assert_eq!(invalid.kind(), Some(&ClientError::NameRequired));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline_after_several_attempts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let start = Instant::now();

        let err = RateLimitRetry::builder()
            .backoff(Backoff::constant(Duration::from_secs(1)))
            .build()
            .unwrap()
            .execute(&CallContext::background(), &Duration::from_millis(2500), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(rate_limited())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_deadline_exhausted());
        assert_eq!(err.status_code(), Some(429));
        // 1s + 1s + 0.5s of waiting, then one more 429 past the deadline.
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts(), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2500) && elapsed < Duration::from_millis(2600));
    }

    #[tokio::test(start_paused = true)]
    async fn context_deadline_caps_the_budget() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1));
        let start = Instant::now();

        let err = RateLimitRetry::builder()
            .backoff(Backoff::constant(Duration::from_millis(400)))
            .build()
            .unwrap()
            .execute(&ctx, &Duration::from_secs(60), || async { Err::<(), _>(rate_limited()) })
            .await
            .unwrap_err();

        assert!(err.is_deadline_exhausted());
        assert_eq!(err.attempts(), 4);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_budget_falls_back_to_default_timeout() {
        let start = Instant::now();
        let err = RateLimitRetry::builder()
            .default_timeout(Duration::from_secs(3))
            .backoff(Backoff::constant(Duration::from_secs(1)))
            .build()
            .unwrap()
            .execute(&CallContext::background(), &None::<Duration>, || async { Err::<(), _>(rate_limited()) })
            .await
            .unwrap_err();

        assert!(err.is_deadline_exhausted());
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_millis(3100));
    }

    #[tokio::test]
    async fn zero_budget_returns_first_429() {
        let sleeper = TrackingSleeper::new();
        let err = policy(sleeper.clone())
            .execute(&CallContext::background(), &Duration::ZERO, || async {
                Err::<(), _>(rate_limited())
            })
            .await
            .unwrap_err();

        assert!(err.is_deadline_exhausted());
        assert_eq!(err.attempts(), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_wait_aborts() {
        let ctx = CallContext::background();
        let handle = ctx.cancel_handle();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            handle.cancel();
        });

        let err = RateLimitRetry::builder()
            .backoff(Backoff::constant(Duration::from_secs(1)))
            .build()
            .unwrap()
            .execute(&ctx, &Duration::from_secs(60), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(rate_limited())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.status_code(), None);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn already_cancelled_context_stops_before_waiting() {
        let ctx = CallContext::background();
        ctx.cancel();

        let err = RateLimitRetry::builder()
            .with_sleeper(InstantSleeper)
            .build()
            .unwrap()
            .execute(&ctx, &Duration::from_secs(60), || async { Err::<(), _>(rate_limited()) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test]
    async fn events_are_sent_to_the_sink() {
        let sink = MemorySink::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let scope = crate::context::ResourceScope::new(
            "webhook-7",
            crate::context::CrudOperation::Update,
            crate::context::ResourceTimeouts::uniform(Duration::from_secs(10)),
        );

        RateLimitRetry::builder()
            .with_sleeper(InstantSleeper)
            .with_sink(sink.clone())
            .build()
            .unwrap()
            .execute(&CallContext::background(), &scope, || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(rate_limited())
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        let events = sink.events_for("webhook-7");
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], RetryEvent::Attempt { attempt: 1, .. }));
        assert!(matches!(events[1], RetryEvent::RateLimited { attempt: 1, delay, .. } if delay == Duration::from_millis(500)));
        assert!(matches!(events[2], RetryEvent::Attempt { attempt: 2, .. }));
        assert!(matches!(events[3], RetryEvent::Succeeded { attempts: 2, .. }));
    }

    #[test]
    fn zero_backoff_is_rejected() {
        let err = RateLimitRetry::builder().backoff(Backoff::constant(Duration::ZERO)).build();
        assert!(matches!(err, Err(BuildError::ZeroBackoff)));
    }

    #[test]
    fn from_config_applies_settings() {
        let config = RetryConfig { timeout_ms: 5_000, ..RetryConfig::default() };
        let policy = RateLimitRetry::from_config(&config).unwrap();
        assert_eq!(policy.default_timeout(), Duration::from_secs(5));
        assert_eq!(policy.backoff(), &Backoff::default());

        let bad = RetryConfig { backoff_base_ms: 0, ..RetryConfig::default() };
        assert!(matches!(RateLimitRetry::from_config(&bad), Err(BuildError::ZeroBackoff)));
    }
}
