//! Error types shared by the client and the retry policy.
use crate::api_error::ApiError;
use crate::taxonomy::{ClassifiedError, StatusClass};
use crate::transport::ApiResponse;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// Type-erased underlying failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Status recorded when no HTTP exchange completed.
pub const STATUS_NONE: u16 = 0;

/// Sentinel failures raised by the client before or around a request.
///
/// Callers branch on the variant instead of comparing strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("name required")]
    NameRequired,
    #[error("id required")]
    IdRequired,
    #[error("hostname required")]
    HostnameRequired,
    #[error("url required")]
    UrlRequired,
    #[error("body must not be nil")]
    BodyRequired,
    #[error("failed encoding request body: {0}")]
    InvalidBody(String),
    #[error("failed decoding response body: {0}")]
    InvalidResponse(String),
}

/// Non-success HTTP response together with its decoded error body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub status: u16,
    pub error: ApiError,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status: {}, response: {}", self.status, self.error.detail())
    }
}

impl std::error::Error for ApiFailure {}

/// A failed remote call: the HTTP status (or [`STATUS_NONE`]) and what went wrong.
///
/// Success is `Ok(_)` from the operation, whatever status it observed; a `RequestError` only ever
/// describes a failure. Values are built fresh per attempt and never modified afterwards.
#[derive(Debug)]
pub struct RequestError {
    status_code: u16,
    err: BoxError,
}

impl RequestError {
    pub fn new(status_code: u16, err: impl Into<BoxError>) -> Self {
        Self { status_code, err: err.into() }
    }

    /// Failure before any HTTP exchange (DNS, TLS, connection reset).
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::new(STATUS_NONE, err)
    }

    /// Precondition failure raised before the transport is touched.
    pub fn invalid(kind: ClientError) -> Self {
        Self::new(STATUS_NONE, kind)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status(&self) -> StatusClass {
        StatusClass::from_code(self.status_code)
    }

    pub fn err(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.err.as_ref()
    }

    pub fn into_err(self) -> BoxError {
        self.err
    }

    /// Whether the retry policy should try again.
    pub fn is_rate_limited(&self) -> bool {
        self.status().is_retryable()
    }

    /// The sentinel kind, if this failure was raised by the client itself.
    pub fn kind(&self) -> Option<&ClientError> {
        self.err.downcast_ref::<ClientError>()
    }

    /// The decoded API error body, if the server answered with a failure status.
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        self.err.downcast_ref::<ApiFailure>()
    }

    /// Attach the status phrase; consumes the raw error.
    pub fn classify(self) -> ClassifiedError {
        ClassifiedError::new(self.status_code, self.err)
    }

    /// Treat `status >= 300` as failure, keeping the decoded error body.
    pub fn check_response(response: ApiResponse) -> Result<ApiResponse, RequestError> {
        if response.status < 300 {
            return Ok(response);
        }
        Err(Self::from_failed_response(response))
    }

    /// Like [`check_response`](Self::check_response) but a 404 counts as success, for deletes of
    /// resources that may already be gone.
    pub fn check_response_allow_not_found(
        response: ApiResponse,
    ) -> Result<ApiResponse, RequestError> {
        if response.status < 300 || response.status == 404 {
            return Ok(response);
        }
        Err(Self::from_failed_response(response))
    }

    fn from_failed_response(response: ApiResponse) -> Self {
        let failure =
            ApiFailure { status: response.status, error: ApiError::from_body(&response.body) };
        Self::new(response.status, failure)
    }

    /// Decode a JSON response body; failures are local, so they carry [`STATUS_NONE`].
    pub fn decode_json<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, RequestError> {
        serde_json::from_str(&response.body)
            .map_err(|e| Self::invalid(ClientError::InvalidResponse(e.to_string())))
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A decoded failure body already names its status.
        if self.status_code == STATUS_NONE || self.api_failure().is_some() {
            write!(f, "{}", self.err)
        } else {
            write!(f, "HTTP {}: {}", self.status_code, self.err)
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.err.as_ref())
    }
}

impl From<ClientError> for RequestError {
    fn from(kind: ClientError) -> Self {
        Self::invalid(kind)
    }
}

/// Final outcome of a failed [`RateLimitRetry`](crate::RateLimitRetry) run.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The failure is not retryable; returned on first occurrence.
    #[error("{last}")]
    Rejected {
        attempts: usize,
        #[source]
        last: ClassifiedError,
    },
    /// Still rate limited when the retry deadline ran out.
    #[error("{last} (gave up after {attempts} attempts in {elapsed:?})")]
    DeadlineExhausted {
        attempts: usize,
        elapsed: Duration,
        #[source]
        last: ClassifiedError,
    },
    /// The call context was cancelled while waiting to retry.
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },
}

impl RetryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_deadline_exhausted(&self) -> bool {
        matches!(self, Self::DeadlineExhausted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The classified error of the last attempt, absent for cancellation.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Rejected { last, .. } | Self::DeadlineExhausted { last, .. } => Some(last),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.classified().map(ClassifiedError::status_code)
    }

    /// Sentinel kind of the last attempt's failure, if the client raised it.
    pub fn kind(&self) -> Option<&ClientError> {
        self.classified().and_then(|c| c.inner().downcast_ref::<ClientError>())
    }

    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Rejected { attempts, .. }
            | Self::DeadlineExhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}
