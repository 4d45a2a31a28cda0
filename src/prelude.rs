//! Convenient re-exports for common types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    client::{Client, ClientConfig},
    context::{CallContext, ResourceScope, ResourceTimeouts, TimeoutSource},
    error::{ClientError, RequestError, RetryError, STATUS_NONE},
    retry::{retry_on_rate_limit, BuildError, RateLimitRetry, RateLimitRetryBuilder},
    taxonomy::{ClassifiedError, StatusClass},
    transport::{ApiRequest, ApiResponse, Method, Transport, TransportError},
    ApiError,
};
