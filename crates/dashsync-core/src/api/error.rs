use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::transport::TransportError;

/// Normalized error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    RateLimit,
    Validation,
    Internal,
}

impl ErrorCode {
    /// Map an HTTP status to its error class.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            404 => ErrorCode::NotFound,
            429 => ErrorCode::RateLimit,
            400..=499 => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call after retries and credential refresh have been exhausted.
///
/// `status` is `None` when no response was received (network error, timeout).
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub status: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape returned by the API: `{ message, errors? | details? }`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    errors: Option<Value>,
    details: Option<Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
            details: None,
        }
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    /// Build an error from a non-success response.
    ///
    /// Uses the error envelope when the body is one, otherwise the (truncated)
    /// body text, falling back to the status line.
    pub fn from_status(status: u16, body: &str) -> Self {
        let code = ErrorCode::from_status(status);
        let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();

        let (message, details) = match envelope {
            Some(env) => (env.message, env.details.or(env.errors)),
            None => (None, None),
        };

        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("Request failed with status {}", status)
                } else {
                    Self::truncate_body(trimmed)
                }
            });

        Self {
            code,
            status: Some(status),
            message,
            details,
        }
    }

    /// Build an error for a call that never produced a response.
    pub fn from_transport(err: &TransportError) -> Self {
        Self::new(ErrorCode::Internal, err.to_string())
    }

    /// Build an error for a body that could not be decoded.
    pub fn decode(what: &str, err: &serde_json::Error) -> Self {
        Self::new(
            ErrorCode::Internal,
            format!("Failed to parse {}: {}", what, err),
        )
    }
}
