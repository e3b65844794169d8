use std::future::Future;

use super::{CacheKey, CacheStore};
use crate::api::ApiError;
use crate::models::TimeseriesResponse;

/// Default bound on distinct series keys.
pub const DEFAULT_MAX_SERIES_KEYS: usize = 50;

/// Default bound on points per series.
/// 2000 points is more than a dashboard chart can show at typical widths.
pub const DEFAULT_MAX_POINTS: usize = 2000;

/// Fixed-stride reduction to at most `max_points` points.
///
/// Keeps every `ceil(len / max_points)`-th point starting with the first, and
/// ends on the original last point so the first-to-last span is unchanged.
/// Deterministic: the same input always yields the same output.
pub fn downsample<P: Clone>(points: &[P], max_points: usize) -> Vec<P> {
    let max_points = max_points.max(1);
    if points.len() <= max_points {
        return points.to_vec();
    }

    let step = points.len().div_ceil(max_points);
    let mut kept: Vec<P> = points.iter().step_by(step).cloned().collect();

    let last = points.len() - 1;
    if (kept.len() - 1) * step != last {
        if kept.len() < max_points {
            kept.push(points[last].clone());
        } else if kept.len() > 1 {
            let end = kept.len() - 1;
            kept[end] = points[last].clone();
        }
    }
    kept
}

/// Bounded cache for time series: at most `max_keys` keys (LRU) and at most
/// `max_points` points per series.
#[derive(Clone)]
pub struct SeriesStore {
    store: CacheStore<TimeseriesResponse>,
    max_points: usize,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SERIES_KEYS, DEFAULT_MAX_POINTS)
    }
}

impl SeriesStore {
    pub fn new(max_keys: usize, max_points: usize) -> Self {
        Self {
            store: CacheStore::bounded(max_keys),
            max_points: max_points.max(1),
        }
    }

    /// Fetch, downsample, and store a series response.
    pub async fn fetch<F>(&self, key: CacheKey, loader: F) -> Result<TimeseriesResponse, ApiError>
    where
        F: Future<Output = Result<TimeseriesResponse, ApiError>>,
    {
        let max_points = self.max_points;
        self.store
            .fetch(key, async move { loader.await.map(|r| r.downsampled(max_points)) })
            .await
    }

    pub fn select(&self, key: &CacheKey) -> Option<TimeseriesResponse> {
        self.store.select(key)
    }

    /// Stored point count across the key's series, without touching recency.
    pub fn point_count(&self, key: &CacheKey) -> Option<usize> {
        self.store
            .entry(key)
            .and_then(|e| e.value.map(|v| v.point_count()))
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn store(&self) -> &CacheStore<TimeseriesResponse> {
        &self.store
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}
