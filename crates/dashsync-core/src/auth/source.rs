use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::api::{new_request_id, ApiError, HttpTransport, OutgoingRequest, REQUEST_ID_HEADER};

/// Where refreshed credentials come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a fresh bearer token. Shape validation is the caller's job.
    async fn fetch_token(&self) -> Result<String, ApiError>;
}

/// Username/password sent to the auth endpoint, when configured.
#[derive(Clone)]
pub struct Login {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token")]
    token: String,
}

/// Calls the auth endpoint directly on the transport.
///
/// Never attaches an Authorization header and never goes through the retrying
/// client, so a refresh can't recurse into another refresh.
pub struct TransportTokenSource {
    transport: Arc<dyn HttpTransport>,
    url: String,
    login: Option<Login>,
}

impl TransportTokenSource {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>, login: Option<Login>) -> Self {
        Self {
            transport,
            url: url.into(),
            login,
        }
    }
}

#[async_trait]
impl TokenSource for TransportTokenSource {
    async fn fetch_token(&self) -> Result<String, ApiError> {
        let mut request = OutgoingRequest::new(Method::POST, self.url.clone());
        request.set_header(REQUEST_ID_HEADER, &new_request_id());
        if let Some(login) = self.login.as_ref() {
            request.body = Some(serde_json::json!({
                "username": login.username,
                "password": login.password,
            }));
        }

        debug!(url = %self.url, "Requesting fresh credential");
        let raw = self
            .transport
            .execute(request)
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        if !raw.is_success() {
            return Err(ApiError::from_status(raw.status, &raw.body));
        }

        let parsed: TokenResponse = serde_json::from_str(&raw.body)
            .map_err(|e| ApiError::decode("token response", &e))?;
        Ok(parsed.token)
    }
}
