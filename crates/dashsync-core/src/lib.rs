//! dashsync core - resilient client state for API-backed dashboards.
//!
//! This crate turns remote API endpoints into locally cached, periodically
//! refreshed values:
//! - [`api`]: the transport client (correlation ids, retry with backoff,
//!   credential refresh and replay, error normalization, failure bus)
//! - [`auth`]: the credential slot with single-flighted refresh
//! - [`cache`]: keyed caches, series downsampling and LRU bounds
//! - [`obs`]: the observability proxy client for Prometheus-backed metrics
//! - [`poll`]: the poll orchestrator with overlap prevention and pause/resume
//! - [`stream`]: an optional server-sent events connection manager
//! - [`dashboard`]: the injectable context wiring everything together

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod models;
pub mod obs;
pub mod poll;
#[cfg(feature = "streaming")]
pub mod stream;

pub use api::{ApiClient, ApiError, ErrorCode, RequestDescriptor};
pub use auth::{Credential, CredentialManager};
pub use cache::{CacheKey, CacheStore, SeriesStore};
pub use config::Config;
pub use dashboard::Dashboard;
pub use poll::{PollTask, Poller, Visibility};
