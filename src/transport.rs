//! Transport call contract.
//!
//! The HTTP stack itself lives outside this crate. Anything that can issue a request and hand
//! back a status and body text implements [`Transport`]; the [`Client`](crate::Client) layers
//! authentication, URL joining and body encoding on top.

use async_trait::async_trait;
use std::fmt;

/// HTTP verbs used by the SendGrid v3 API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-resolved request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Encoded JSON body, if any.
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response: status and body text. No interpretation happens at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Failure before an HTTP exchange completed.
///
/// Display renders the context message followed by the underlying cause, if any.
#[derive(Debug)]
pub struct TransportError {
    message: String,
    source: Option<crate::error::BoxError>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<crate::error::BoxError>) -> Self {
        Self { message: message.into(), source: Some(source.into()) }
    }
}

/// Issues a single HTTP request. Implementations never retry and never enhance errors.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn issue_request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T> Transport for std::sync::Arc<T>
where
    T: Transport + ?Sized,
{
    async fn issue_request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).issue_request(request).await
    }
}
