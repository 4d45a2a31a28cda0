//! Error taxonomy for SendGrid API failures.
//!
//! Two independent classifiers:
//! - [`enhance_error`] picks a phrase purely from the HTTP status code.
//! - [`classify_message`] looks for known substrings in the upstream error text.
//!
//! Both only ever add context; the original error text is always kept in the resulting message.
//!
//! ```rust
//! use sendgrid_retry::taxonomy::{classify_message, enhance_error};
//!
//! let err = enhance_error(Some("too many requests"), 429).unwrap();
//! assert!(err.to_string().contains("rate limit exceeded (HTTP 429)"));
//! assert!(err.to_string().contains("too many requests"));
//!
//! let (msg, enhanced) = classify_message(Some(&"permission denied for key"));
//! assert!(enhanced);
//! assert!(msg.contains("permission denied"));
//! ```

use crate::error::BoxError;
use std::fmt;

/// HTTP status grouped into the classes the client reports on.
///
/// `from_code` is total: every `u16` maps to exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    /// Any 5xx.
    Server(u16),
    /// Anything else, including `0` when no HTTP exchange happened.
    Other(u16),
}

impl StatusClass {
    pub fn from_code(code: u16) -> Self {
        match code {
            400 => StatusClass::BadRequest,
            401 => StatusClass::Unauthorized,
            403 => StatusClass::Forbidden,
            404 => StatusClass::NotFound,
            429 => StatusClass::RateLimited,
            500..=599 => StatusClass::Server(code),
            other => StatusClass::Other(other),
        }
    }

    /// The numeric status this class was built from.
    pub fn code(&self) -> u16 {
        match self {
            StatusClass::BadRequest => 400,
            StatusClass::Unauthorized => 401,
            StatusClass::Forbidden => 403,
            StatusClass::NotFound => 404,
            StatusClass::RateLimited => 429,
            StatusClass::Server(code) | StatusClass::Other(code) => *code,
        }
    }

    /// Only rate limiting is treated as transient. 5xx is deliberately terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusClass::RateLimited)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code())
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, StatusClass::Server(_))
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusClass::BadRequest => write!(f, "bad request (HTTP 400)"),
            StatusClass::Unauthorized => write!(f, "unauthorized (HTTP 401)"),
            StatusClass::Forbidden => write!(f, "forbidden (HTTP 403)"),
            StatusClass::NotFound => write!(f, "resource not found (HTTP 404)"),
            StatusClass::RateLimited => write!(f, "rate limit exceeded (HTTP 429)"),
            StatusClass::Server(code) => write!(f, "server error (HTTP {})", code),
            StatusClass::Other(code) => write!(f, "request failed with HTTP {}", code),
        }
    }
}

/// Content-based hint derived from upstream error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    InvalidScopes,
    PermissionDenied,
    NotFound,
    Validation,
}

impl MessageClass {
    /// Match rules in precedence order; the first hit wins.
    pub fn detect(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if has("scope") && (has("invalid") || has("unassignable")) {
            Some(MessageClass::InvalidScopes)
        } else if has("permission") || has("unauthorized") {
            Some(MessageClass::PermissionDenied)
        } else if has("not found") || has("404") {
            Some(MessageClass::NotFound)
        } else if has("validation") || has("invalid") {
            Some(MessageClass::Validation)
        } else {
            None
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            MessageClass::InvalidScopes => "invalid or unassignable scopes",
            MessageClass::PermissionDenied => "permission denied",
            MessageClass::NotFound => "resource not found",
            MessageClass::Validation => "validation error",
        }
    }

    fn advice(&self) -> &'static str {
        match self {
            MessageClass::InvalidScopes => {
                "the API key lacks one of the requested scopes, or the scope cannot be granted"
            }
            MessageClass::PermissionDenied => "check the API key and its assigned permissions",
            MessageClass::NotFound => "the resource may have been deleted outside of this client",
            MessageClass::Validation => "check the request fields against the API reference",
        }
    }
}

/// Best-effort content classification of an error message.
///
/// Returns the enhanced message and whether any rule matched. An absent error yields an empty
/// message and `false`.
pub fn classify_message<E>(err: Option<&E>) -> (String, bool)
where
    E: fmt::Display + ?Sized,
{
    let Some(err) = err else {
        return (String::new(), false);
    };
    let original = err.to_string();
    match MessageClass::detect(&original) {
        Some(class) => (format!("{}: {} ({})", class.phrase(), class.advice(), original), true),
        None => (original, false),
    }
}

/// Attach the status-code phrase to `err`. `None` in, `None` out.
pub fn enhance_error<E>(err: Option<E>, status_code: u16) -> Option<ClassifiedError>
where
    E: Into<BoxError>,
{
    err.map(|e| ClassifiedError::new(status_code, e))
}

/// An underlying failure annotated with its status class.
///
/// Display renders `"<status phrase>: <original error>"`.
#[derive(Debug)]
pub struct ClassifiedError {
    status: StatusClass,
    source: BoxError,
}

impl ClassifiedError {
    pub fn new(status_code: u16, source: impl Into<BoxError>) -> Self {
        Self { status: StatusClass::from_code(status_code), source: source.into() }
    }

    pub fn status(&self) -> StatusClass {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.code()
    }

    pub fn phrase(&self) -> String {
        self.status.to_string()
    }

    /// Borrow the original, unenhanced error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    pub fn into_inner(self) -> BoxError {
        self.source
    }

    /// Content-derived hint for the original error text, if any rule matches.
    pub fn hint(&self) -> Option<MessageClass> {
        MessageClass::detect(&self.source.to_string())
    }

    /// User-facing rendering: the status-coded message, followed by the content hint when the
    /// upstream text matches a known pattern.
    pub fn diagnostic(&self) -> String {
        let (hinted, enhanced) = classify_message(Some(self.source.as_ref()));
        if enhanced {
            format!("{}; {}", self, hinted)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.source)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
