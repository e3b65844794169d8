use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::CacheKey;
use crate::api::ApiError;

/// Value and fetch state for one key.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub value: Option<T>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub loading: bool,
    pub error: Option<ApiError>,
}

impl<T> CacheEntry<T> {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            value: None,
            fetched_at: None,
            loading: false,
            error: None,
        }
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.fetched_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let Some(minutes) = self.age_minutes() else {
            return "never".to_string();
        };
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Never-fetched entries are stale.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.fetched_at {
            Some(at) => Utc::now() - at > max_age,
            None => true,
        }
    }
}

struct StoreState<T> {
    entries: LruCache<CacheKey, CacheEntry<T>>,
    evictions: u64,
    /// Bumped by `clear` so a fetch started before it can't write its result back.
    generation: u64,
}

impl<T> StoreState<T> {
    fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            entries,
            evictions: 0,
            generation: 0,
        }
    }

    /// Promote `key`, inserting it (and evicting the LRU key if full) when new.
    fn touch(&mut self, key: &CacheKey) -> Option<&mut CacheEntry<T>> {
        if !self.entries.contains(key) {
            // The key is new, so anything handed back was evicted to make room
            if let Some((evicted, _)) = self.entries.push(key.clone(), CacheEntry::new(key.clone())) {
                self.evictions += 1;
                debug!(evicted = %evicted, inserting = %key, "Evicted least recently used cache key");
            }
        }
        self.entries.get_mut(key)
    }
}

/// Keyed cache over async loaders.
///
/// Writes are last-write-wins by completion order: when two fetches for the
/// same key overlap, whichever finishes last determines the stored value.
/// A fetch that was still running when [`CacheStore::clear`] was called
/// returns its outcome to the caller but stores nothing.
/// Clone is cheap and shares the entries.
pub struct CacheStore<T> {
    state: Arc<Mutex<StoreState<T>>>,
    capacity: Option<NonZeroUsize>,
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the loading flag if a fetch is dropped before its loader finishes.
struct LoadingGuard<'a, T> {
    store: &'a CacheStore<T>,
    key: &'a CacheKey,
    generation: u64,
    armed: bool,
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.store.state.lock();
        if state.generation != self.generation {
            return;
        }
        if let Some(entry) = state.entries.peek_mut(self.key) {
            entry.loading = false;
        }
    }
}

impl<T: Clone> CacheStore<T> {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Store holding at most `max_keys` keys, evicting the least recently used.
    pub fn bounded(max_keys: usize) -> Self {
        Self::with_capacity(NonZeroUsize::new(max_keys.max(1)))
    }

    fn with_capacity(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    /// Run `loader` and record its outcome under `key`.
    ///
    /// Marks the key loading and clears its previous error first; on success
    /// stores the value, on failure stores the error (the previous value is
    /// kept). Loading is cleared in every case. Concurrent fetches of the
    /// same key are not deduplicated.
    pub async fn fetch<F>(&self, key: CacheKey, loader: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let generation = {
            let mut state = self.state.lock();
            if let Some(entry) = state.touch(&key) {
                entry.loading = true;
                entry.error = None;
            }
            state.generation
        };
        let mut guard = LoadingGuard {
            store: self,
            key: &key,
            generation,
            armed: true,
        };

        let outcome = loader.await;

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!(key = %key, "Store cleared while fetching, discarding result");
            } else if let Some(entry) = state.touch(&key) {
                match &outcome {
                    Ok(value) => {
                        entry.value = Some(value.clone());
                        entry.fetched_at = Some(Utc::now());
                    }
                    Err(err) => {
                        debug!(key = %key, code = %err.code, "Fetch failed");
                        entry.error = Some(err.clone());
                    }
                }
                entry.loading = false;
            }
        }
        guard.armed = false;

        outcome
    }

    /// Current value, promoting the key's recency. Never fetches.
    pub fn select(&self, key: &CacheKey) -> Option<T> {
        self.state.lock().entries.get(key).and_then(|e| e.value.clone())
    }

    pub fn select_or(&self, key: &CacheKey, default: T) -> T {
        self.select(key).unwrap_or(default)
    }

    /// Snapshot of value and metadata, without touching recency.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.state.lock().entries.peek(key).cloned()
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        self.state
            .lock()
            .entries
            .peek(key)
            .map(|e| e.loading)
            .unwrap_or(false)
    }

    pub fn error(&self, key: &CacheKey) -> Option<ApiError> {
        self.state.lock().entries.peek(key).and_then(|e| e.error.clone())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evictions(&self) -> u64 {
        self.state.lock().evictions
    }

    /// Drop every entry. Fetches still in flight won't store their results.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.generation += 1;
        debug!("Cache cleared");
    }
}
