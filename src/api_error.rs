//! Opaque error payloads returned by the SendGrid API.
//!
//! Error bodies come in several shapes (`{"errors": [...]}`, `{"detail": "..."}`, plain text), so
//! the payload is kept as a tagged variant and rendered on demand.

use serde_json::{Map, Value};
use std::fmt;

/// Marker rendered for an absent payload.
pub const ABSENT_DETAIL: &str = "<nil>";

/// Decoded error body of unknown shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Absent,
    Text(String),
    Object(Map<String, Value>),
}

/// Wrapper around an arbitrary error payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiError {
    payload: Payload,
}

impl ApiError {
    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    /// Build from a raw response body. JSON objects and strings keep their shape; any other JSON
    /// value, or text that is not JSON at all, is kept verbatim as text.
    pub fn from_body(body: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(body) {
            Ok(value) => Payload::from(value),
            Err(_) => Payload::Text(body.to_string()),
        };
        Self { payload }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Best available human-readable string for this payload.
    pub fn detail(&self) -> String {
        match &self.payload {
            Payload::Absent => ABSENT_DETAIL.to_string(),
            Payload::Text(text) => text.clone(),
            Payload::Object(map) => match map.get("detail") {
                Some(Value::String(detail)) => detail.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(map.clone()).to_string(),
            },
        }
    }

    /// True only when there is no payload at all; an empty object is still a payload.
    pub fn is_empty(&self) -> bool {
        matches!(self.payload, Payload::Absent)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Absent,
            Value::String(text) => Payload::Text(text),
            Value::Object(map) => Payload::Object(map),
            other => Payload::Text(other.to_string()),
        }
    }
}

impl From<Value> for ApiError {
    fn from(value: Value) -> Self {
        Self::new(Payload::from(value))
    }
}

impl From<String> for ApiError {
    fn from(text: String) -> Self {
        Self::new(Payload::Text(text))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail())
    }
}

impl std::error::Error for ApiError {}
