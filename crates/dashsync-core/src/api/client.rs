//! API client: the single chokepoint for outbound calls.
//!
//! `submit` layers three recovery mechanisms on top of one transport exchange:
//! 1. a single credential refresh and replay on 401
//! 2. exponential-backoff retries of side-effect-free requests on network
//!    errors, timeouts, and 5xx
//! 3. normalization of anything left into an [`ApiError`], published on the
//!    failure bus before it is returned

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::envelope::Page;
use super::observer::{FailureBus, FailureContext};
use super::request::RequestDescriptor;
use super::retry::RetryPolicy;
use super::transport::{HttpTransport, OutgoingRequest, RawResponse, TransportError};
use super::{new_request_id, ApiError, REQUEST_ID_HEADER};
use crate::auth::{Credential, CredentialManager};

/// Process-wide call counters, shared by all clones of a client.
#[derive(Debug, Default)]
pub struct ClientStats {
    calls: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    auth_replays: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub errors: u64,
    pub retries: u64,
    pub auth_replays: u64,
}

impl ClientStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            auth_replays: self.auth_replays.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub request_id: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::decode("JSON response", &e))
    }
}

/// How a single exchange failed.
enum Failure {
    Status(RawResponse),
    Transport(TransportError),
}

impl Failure {
    /// No response at all, or a server error.
    fn is_transient(&self) -> bool {
        match self {
            Failure::Status(raw) => (500..600).contains(&raw.status),
            Failure::Transport(_) => true,
        }
    }

    fn normalize(&self) -> ApiError {
        match self {
            Failure::Status(raw) => ApiError::from_status(raw.status, &raw.body),
            Failure::Transport(err) => ApiError::from_transport(err),
        }
    }
}

struct ClientInner {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    auth_path: String,
    retry: RetryPolicy,
    credentials: CredentialManager,
    failures: FailureBus,
    stats: ClientStats,
}

/// Resilient API client.
/// Clone is cheap - all clones share transport, credential slot, bus, and counters.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        auth_path: impl Into<String>,
        retry: RetryPolicy,
        credentials: CredentialManager,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                base_url: base_url.into(),
                auth_path: auth_path.into(),
                retry,
                credentials,
                failures: FailureBus::new(),
                stats: ClientStats::default(),
            }),
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.inner.credentials
    }

    pub fn failures(&self) -> &FailureBus {
        &self.inner.failures
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Issue a request, recovering from transient failures and expired credentials.
    pub async fn submit(&self, mut request: RequestDescriptor) -> Result<ApiResponse, ApiError> {
        ClientStats::bump(&self.inner.stats.calls);

        loop {
            let sent_with = self.credential_for(&request);
            let outgoing = self.prepare(&request, sent_with.as_ref());
            let request_id = outgoing
                .header(REQUEST_ID_HEADER)
                .unwrap_or_default()
                .to_string();

            debug!(
                method = %request.method,
                path = %request.path,
                attempt = request.attempt,
                request_id = %request_id,
                "Sending request"
            );

            let failure = match self.inner.transport.execute(outgoing).await {
                Ok(raw) if raw.is_success() => {
                    return Ok(ApiResponse {
                        status: raw.status,
                        body: raw.body,
                        request_id,
                    });
                }
                Ok(raw) if raw.status == 401 && self.can_replay_for_auth(&request) => {
                    request.auth_replayed = true;
                    if self.refresh_for_replay(sent_with.as_ref()).await {
                        ClientStats::bump(&self.inner.stats.auth_replays);
                        debug!(path = %request.path, "Replaying request with refreshed credential");
                        continue;
                    }
                    Failure::Status(raw)
                }
                Ok(raw) => Failure::Status(raw),
                Err(err) => Failure::Transport(err),
            };

            if request.is_side_effect_free()
                && failure.is_transient()
                && self.inner.retry.allows(request.attempt)
            {
                let delay = self.inner.retry.delay_for(request.attempt);
                warn!(
                    method = %request.method,
                    path = %request.path,
                    retry = request.attempt + 1,
                    backoff_ms = delay.as_millis() as u64,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                request.attempt += 1;
                ClientStats::bump(&self.inner.stats.retries);
                continue;
            }

            return Err(self.fail(&request, &request_id, failure.normalize()));
        }
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ApiError> {
        let context = self.context_for(&request);
        let response = self.submit(request).await?;
        response.json().map_err(|e| self.report(e, context, &response.request_id))
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::decode("request body", &e))?;
        self.get_json(RequestDescriptor::post(path).body(body)).await
    }

    /// Fetch a list endpoint that answers with a bare array or `{ items, nextOffset? }`.
    pub async fn get_list<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<Page<T>, ApiError> {
        let context = self.context_for(&request);
        let response = self.submit(request).await?;
        Page::from_body(&response.body).map_err(|e| self.report(e, context, &response.request_id))
    }

    /// Whether `request` targets the credential-acquisition endpoint.
    ///
    /// Relative paths compare without their leading slash; absolute URLs match
    /// on their trailing path segments.
    fn is_auth_endpoint(&self, request: &RequestDescriptor) -> bool {
        let auth = self.inner.auth_path.trim_matches('/');
        if auth.is_empty() {
            return false;
        }
        let path = request.normalized_path();
        if path.starts_with("http://") || path.starts_with("https://") {
            path.strip_suffix(auth)
                .map(|rest| rest.ends_with('/'))
                .unwrap_or(false)
        } else {
            path.trim_start_matches('/') == auth
        }
    }

    fn credential_for(&self, request: &RequestDescriptor) -> Option<Credential> {
        if request.skip_auth || self.is_auth_endpoint(request) {
            None
        } else {
            self.inner.credentials.current()
        }
    }

    fn can_replay_for_auth(&self, request: &RequestDescriptor) -> bool {
        !request.auth_replayed && !request.skip_auth && !self.is_auth_endpoint(request)
    }

    /// Make a fresh credential available for a replay.
    ///
    /// If a concurrent caller already replaced the credential this request was
    /// sent with, that one is used without another refresh.
    async fn refresh_for_replay(&self, sent_with: Option<&Credential>) -> bool {
        if let Some(current) = self.inner.credentials.current() {
            let newer = sent_with.map(|s| s.token != current.token).unwrap_or(true);
            if newer {
                return true;
            }
        }
        self.inner.credentials.acquire().await.is_some()
    }

    fn prepare(&self, request: &RequestDescriptor, credential: Option<&Credential>) -> OutgoingRequest {
        let mut outgoing = OutgoingRequest::new(
            request.method.clone(),
            join_url(&self.inner.base_url, &request.path),
        );
        outgoing.query = request.query.clone();
        outgoing.body = request.body.clone();
        for (name, value) in &request.headers {
            outgoing.set_header(name, value);
        }
        outgoing.set_header(REQUEST_ID_HEADER, &new_request_id());
        if let Some(credential) = credential {
            outgoing.set_header("authorization", &credential.bearer());
        }
        outgoing
    }

    fn context_for(&self, request: &RequestDescriptor) -> FailureContext {
        FailureContext {
            method: request.method.to_string(),
            path: request.path.clone(),
            request_id: String::new(),
        }
    }

    fn fail(&self, request: &RequestDescriptor, request_id: &str, error: ApiError) -> ApiError {
        let mut context = self.context_for(request);
        context.request_id = request_id.to_string();
        self.report(error, context, request_id)
    }

    /// Count and publish an error that is about to reach the caller.
    fn report(&self, error: ApiError, mut context: FailureContext, request_id: &str) -> ApiError {
        if context.request_id.is_empty() {
            context.request_id = request_id.to_string();
        }
        ClientStats::bump(&self.inner.stats.errors);
        debug!(code = %error.code, status = ?error.status, path = %context.path, "Request failed");
        self.inner.failures.publish(&error, &context);
        error
    }
}

/// Resolve `path` against `base`; absolute URLs pass through unchanged.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
