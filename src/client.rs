//! Thin SendGrid API client over a [`Transport`].
//!
//! Each verb wrapper resolves the URL, adds authentication headers, issues exactly one request
//! and returns either the raw response or a [`RequestError`] with status `0` for failures that
//! happened before an HTTP exchange. Status checking and retrying are left to the caller, which
//! typically runs these inside [`retry_on_rate_limit`](crate::retry_on_rate_limit).

use crate::error::{ClientError, RequestError};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base URL used when none is configured.
pub const DEFAULT_HOST: &str = "https://api.sendgrid.com/v3/";

pub const ENV_API_KEY: &str = "SENDGRID_API_KEY";
pub const ENV_HOST: &str = "SENDGRID_HOST";
pub const ENV_ON_BEHALF_OF: &str = "SENDGRID_ON_BEHALF_OF";

/// Connection settings for a [`Client`].
///
/// An empty API key is accepted here; the API rejects it at call time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: String,
    pub host: String,
    /// Subuser to act on behalf of; empty for the parent account.
    pub on_behalf_of: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { api_key: String::new(), host: DEFAULT_HOST.to_string(), on_behalf_of: String::new() }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .field("on_behalf_of", &self.on_behalf_of)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), ..Self::default() }
    }

    /// Override the base URL; an empty string keeps the default.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !host.is_empty() {
            self.host = host;
        }
        self
    }

    pub fn on_behalf_of(mut self, subuser: impl Into<String>) -> Self {
        self.on_behalf_of = subuser.into();
        self
    }

    /// Read settings from `SENDGRID_API_KEY`, `SENDGRID_HOST` and `SENDGRID_ON_BEHALF_OF`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(lookup(ENV_API_KEY).unwrap_or_default())
            .with_host(lookup(ENV_HOST).unwrap_or_default())
            .on_behalf_of(lookup(ENV_ON_BEHALF_OF).unwrap_or_default())
    }
}

/// SendGrid API client.
#[derive(Debug, Clone)]
pub struct Client<T> {
    config: ClientConfig,
    transport: T,
}

impl<T> Client<T>
where
    T: Transport,
{
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let config = if config.host.is_empty() { config.with_host(DEFAULT_HOST) } else { config };
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Join `path` onto the configured base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.host.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, RequestError> {
        self.send(Method::Get, path, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, RequestError> {
        self.send(Method::Delete, path, None).await
    }

    pub async fn post<B>(&self, path: &str, body: Option<&B>) -> Result<ApiResponse, RequestError>
    where
        B: Serialize + ?Sized,
    {
        self.send_json(Method::Post, path, body).await
    }

    pub async fn patch<B>(&self, path: &str, body: Option<&B>) -> Result<ApiResponse, RequestError>
    where
        B: Serialize + ?Sized,
    {
        self.send_json(Method::Patch, path, body).await
    }

    pub async fn put<B>(&self, path: &str, body: Option<&B>) -> Result<ApiResponse, RequestError>
    where
        B: Serialize + ?Sized,
    {
        self.send_json(Method::Put, path, body).await
    }

    /// Issue a request that must carry a JSON body.
    pub async fn send_json<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse, RequestError>
    where
        B: Serialize + ?Sized,
    {
        let encoded = body_to_json(body)?;
        self.send(method, path, Some(encoded)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<ApiResponse, RequestError> {
        let request = self.build_request(method, path, body);
        tracing::trace!(method = %method, url = %request.url, "issuing request");
        self.transport.issue_request(request).await.map_err(|e| {
            RequestError::transport(crate::transport::TransportError::with_source(
                format!("{} {} failed", method, path),
                e,
            ))
        })
    }

    fn build_request(&self, method: Method, path: &str, body: Option<String>) -> ApiRequest {
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", self.config.api_key)),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if !self.config.on_behalf_of.is_empty() {
            headers.push(("on-behalf-of".to_string(), self.config.on_behalf_of.clone()));
        }
        ApiRequest { method, url: self.url(path), headers, body }
    }
}

/// Encode a request body; a missing or JSON-null body is a [`ClientError::BodyRequired`].
pub fn body_to_json<B>(body: Option<&B>) -> Result<String, ClientError>
where
    B: Serialize + ?Sized,
{
    let body = body.ok_or(ClientError::BodyRequired)?;
    let value = serde_json::to_value(body).map_err(|e| ClientError::InvalidBody(e.to_string()))?;
    if value.is_null() {
        return Err(ClientError::BodyRequired);
    }
    Ok(value.to_string())
}
