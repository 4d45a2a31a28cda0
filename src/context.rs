//! Call context: cancellation, deadlines and retry budgets.
//!
//! A [`CallContext`] travels with a single logical call. Cloning it shares the cancellation
//! signal; [`CallContext::child`] keeps the signal but can only tighten the deadline.
//!
//! The retry budget itself comes from a [`TimeoutSource`], usually the per-operation timeouts of
//! the resource being managed.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Handle that cancels every context sharing it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel cannot be missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancellation plus an optional deadline for one logical call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancelHandle,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// A fresh context expiring `timeout` from now. A timeout too large to represent leaves the
    /// context without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().tightened(timeout)
    }

    /// Set the deadline, keeping an earlier one if already present.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));
        self
    }

    /// Same cancellation signal, deadline at most `timeout` from now.
    pub fn child(&self, timeout: Duration) -> Self {
        self.clone().tightened(timeout)
    }

    fn tightened(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Supplies the retry budget for a call and an identifier used in logs and telemetry.
pub trait TimeoutSource: Send + Sync {
    /// Maximum time to keep retrying; `None` defers to the policy default.
    fn retry_timeout(&self) -> Option<Duration>;

    fn call_id(&self) -> &str {
        ""
    }
}

impl TimeoutSource for Duration {
    fn retry_timeout(&self) -> Option<Duration> {
        Some(*self)
    }
}

impl TimeoutSource for Option<Duration> {
    fn retry_timeout(&self) -> Option<Duration> {
        *self
    }
}

impl<T> TimeoutSource for &T
where
    T: TimeoutSource + ?Sized,
{
    fn retry_timeout(&self) -> Option<Duration> {
        (**self).retry_timeout()
    }

    fn call_id(&self) -> &str {
        (**self).call_id()
    }
}

/// Lifecycle operation of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudOperation {
    Create,
    Read,
    Update,
    Delete,
}

/// Per-operation timeouts of a managed resource, in milliseconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTimeouts {
    #[serde(with = "opt_millis")]
    pub create: Option<Duration>,
    #[serde(with = "opt_millis")]
    pub read: Option<Duration>,
    #[serde(with = "opt_millis")]
    pub update: Option<Duration>,
    #[serde(with = "opt_millis")]
    pub delete: Option<Duration>,
}

impl ResourceTimeouts {
    /// The same timeout for every operation.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: Some(timeout),
            read: Some(timeout),
            update: Some(timeout),
            delete: Some(timeout),
        }
    }

    pub fn for_operation(&self, operation: CrudOperation) -> Option<Duration> {
        match operation {
            CrudOperation::Create => self.create,
            CrudOperation::Read => self.read,
            CrudOperation::Update => self.update,
            CrudOperation::Delete => self.delete,
        }
    }
}

/// A resource identifier bound to the operation being performed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    id: String,
    operation: CrudOperation,
    timeouts: ResourceTimeouts,
}

impl ResourceScope {
    pub fn new(id: impl Into<String>, operation: CrudOperation, timeouts: ResourceTimeouts) -> Self {
        Self { id: id.into(), operation, timeouts }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operation(&self) -> CrudOperation {
        self.operation
    }
}

impl TimeoutSource for ResourceScope {
    fn retry_timeout(&self) -> Option<Duration> {
        self.timeouts.for_operation(self.operation)
    }

    fn call_id(&self) -> &str {
        &self.id
    }
}

pub(crate) mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
