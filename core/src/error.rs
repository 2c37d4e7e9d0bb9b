//! Error types for the dashboard API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the resource does not exist" from "the server returned an unexpected
//! status." All other non-2xx responses land in `HttpStatus` with the raw
//! status code and body. `Transport` covers everything that never produced
//! an HTTP answer at all, so a dashboard can tell "backend unreachable" apart
//! from "backend said no".

use thiserror::Error;

/// Errors returned by the transport, the gateways and the validators.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, DNS,
    /// broken stream).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server returned 404 for a resource-scoped operation.
    #[error("resource not found")]
    NotFound { body: String },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Input rejected before any request was issued.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl ApiError {
    /// Status code carried by the error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server's `detail` message when the error body is the usual
    /// `{"detail": "..."}` envelope. Falls back to the raw body.
    pub fn detail(&self) -> Option<String> {
        let body = match self {
            ApiError::NotFound { body } | ApiError::HttpStatus { body, .. } => body,
            _ => return None,
        };
        if body.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => match map.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => Some(body.clone()),
            },
            _ => Some(body.clone()),
        }
    }

    /// True when the backend could not be reached or answered with garbage.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Deserialization(_))
    }
}
