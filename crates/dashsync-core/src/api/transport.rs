//! The wire underneath [`ApiClient`](super::ApiClient).
//!
//! [`HttpTransport`] performs exactly one HTTP exchange and knows nothing about
//! retries or credentials. [`ReqwestTransport`] is the production
//! implementation.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// A fully prepared request: absolute URL, final headers, optional JSON body.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set a header, ignoring names or values that are not valid header text.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            trace!(header = name, "Skipping invalid header");
            return;
        };
        self.headers.insert(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Status and body of a received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A call that produced no response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Network error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a single exchange. Non-2xx statuses are responses, not errors.
    async fn execute(&self, request: OutgoingRequest) -> Result<RawResponse, TransportError>;
}

/// Production transport over a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport whose every request carries `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        trace!(status, bytes = body.len(), "response received");

        Ok(RawResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(304, "").is_success());
        assert!(!RawResponse::new(401, "").is_success());
        assert!(!RawResponse::new(503, "").is_success());
    }

    #[test]
    fn test_set_header_skips_invalid_values() {
        let mut req = OutgoingRequest::new(Method::GET, "http://localhost/x");
        req.set_header("x-request-id", "abc");
        req.set_header("authorization", "bad\nvalue");
        assert_eq!(req.header("x-request-id"), Some("abc"));
        assert!(req.header("authorization").is_none());

        req.set_header("X-Obs-Api-Key", "k");
        req.set_header("bad header", "v");
        assert_eq!(req.header("x-obs-api-key"), Some("k"));
        assert_eq!(req.headers.len(), 2);
    }
}
