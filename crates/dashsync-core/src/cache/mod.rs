//! In-memory caches for fetched dashboard data.
//!
//! This module provides:
//! - `CacheKey`: a stable key derived from an operation and its parameters
//! - `CacheStore`: a keyed cache over async loaders with per-key loading and
//!   error state, optionally bounded with LRU eviction
//! - `SeriesStore`: a bounded store for time series that downsamples every
//!   series before storing it
//!
//! Reads never fetch; callers (usually poll tasks) decide when to refresh.

pub mod key;
pub mod series;
pub mod store;

pub use key::CacheKey;
pub use series::{downsample, SeriesStore};
pub use store::{CacheEntry, CacheStore};
