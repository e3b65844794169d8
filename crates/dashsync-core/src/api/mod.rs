//! Transport client for the remote dashboard API.
//!
//! Every outbound call goes through [`ApiClient::submit`], which attaches the
//! bearer credential and a correlation id, retries transient failures of
//! side-effect-free requests, refreshes the credential once on a 401, and
//! normalizes whatever is left into an [`ApiError`] that is also published on
//! the [`FailureBus`].

pub mod client;
pub mod envelope;
pub mod error;
pub mod observer;
pub mod request;
pub mod retry;
pub mod transport;

pub use client::{ApiClient, ApiResponse, ClientStats, StatsSnapshot};
pub use envelope::{ListEnvelope, Page};
pub use error::{ApiError, ErrorCode};
pub use observer::{
    ChannelObserver, FailureBus, FailureContext, FailureObserver, LogObserver, SubscriptionId,
};
pub use request::{Idempotency, RequestDescriptor};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, OutgoingRequest, RawResponse, ReqwestTransport, TransportError};

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a process-unique correlation id for an outbound request.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
