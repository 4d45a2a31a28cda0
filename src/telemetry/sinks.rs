use super::events::RetryEvent;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A telemetry sink that consumes retry events.
pub trait TelemetrySink:
    tower::Service<RetryEvent, Response = (), Error = Self::SinkError> + Clone + Send + Sync + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: RetryEvent)
where
    S: tower::Service<RetryEvent, Response = ()> + Send + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<RetryEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: RetryEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// Logs events through `tracing`; terminal events at info, the rest at debug.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<RetryEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RetryEvent) -> Self::Future {
        if event.is_terminal() {
            tracing::info!(event = %event, "retry_event");
        } else {
            tracing::debug!(event = %event, "retry_event");
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// Keeps the most recent events in memory; the oldest are evicted at capacity.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RetryEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<RetryEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events recorded for one call.
    pub fn events_for(&self, call_id: &str) -> Vec<RetryEvent> {
        self.events.lock().unwrap().iter().filter(|e| e.call_id() == call_id).cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<RetryEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RetryEvent) -> Self::Future {
        let mut guard = self.events.lock().unwrap();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn attempt(call_id: &str, attempt: usize) -> RetryEvent {
        RetryEvent::Attempt { call_id: call_id.into(), attempt }
    }

    #[tokio::test]
    async fn memory_sink_records_and_filters() {
        let sink = MemorySink::new();
        emit_best_effort(sink.clone(), attempt("a", 1)).await;
        emit_best_effort(sink.clone(), attempt("b", 1)).await;
        emit_best_effort(
            sink.clone(),
            RetryEvent::Succeeded { call_id: "a".into(), attempts: 1, elapsed: Duration::ZERO },
        )
        .await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_for("a").len(), 2);
        assert_eq!(sink.events_for("b"), vec![attempt("b", 1)]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn memory_sink_evicts_oldest_at_capacity() {
        let sink = MemorySink::with_capacity(2);
        for n in 1..=3 {
            emit_best_effort(sink.clone(), attempt("x", n)).await;
        }
        assert_eq!(sink.events(), vec![attempt("x", 2), attempt("x", 3)]);
        assert_eq!(sink.evicted(), 1);
    }

    #[tokio::test]
    async fn emit_best_effort_swallows_errors() {
        #[derive(Clone)]
        struct Fails;
        impl tower::Service<RetryEvent> for Fails {
            type Response = ();
            type Error = std::io::Error;
            type Future = BoxFuture<'static, Result<(), Self::Error>>;
            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }
            fn call(&mut self, _req: RetryEvent) -> Self::Future {
                Box::pin(async { Err(std::io::Error::new(std::io::ErrorKind::Other, "fail")) })
            }
        }

        emit_best_effort(Fails, attempt("x", 1)).await;
    }

    #[tokio::test]
    async fn null_and_log_sinks_accept_everything() {
        emit_best_effort(NullSink, attempt("x", 1)).await;
        emit_best_effort(LogSink, RetryEvent::Cancelled { call_id: "x".into(), attempts: 2 })
            .await;
    }
}
