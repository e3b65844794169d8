use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{is_structurally_valid, Credential, TokenSource, TokenStore};
use crate::api::{ApiError, ErrorCode};

/// Minimum time between two refresh attempts.
/// 30s keeps a broken auth endpoint from being hammered by every failing poll.
pub const DEFAULT_REFRESH_COOLDOWN_SECS: u64 = 30;

type PendingRefresh = Shared<BoxFuture<'static, Option<Credential>>>;

#[derive(Default)]
struct RefreshState {
    in_flight: Option<PendingRefresh>,
    last_attempt: Option<Instant>,
    /// Bumped on logout so a refresh started before it can't install its result.
    generation: u64,
}

struct Inner {
    current: RwLock<Option<Credential>>,
    refresh: Mutex<RefreshState>,
    source: Arc<dyn TokenSource>,
    store: Arc<dyn TokenStore>,
}

/// Shared credential slot with single-flighted refresh.
/// Clone is cheap and shares the slot.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
    cooldown: Duration,
}

impl CredentialManager {
    pub fn new(source: Arc<dyn TokenSource>, store: Arc<dyn TokenStore>, cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(None),
                refresh: Mutex::new(RefreshState::default()),
                source,
                store,
            }),
            cooldown,
        }
    }

    /// Restore a persisted credential. Returns whether one was found.
    pub fn load(&self) -> bool {
        match self.inner.store.load() {
            Ok(Some(credential)) => {
                *self.inner.current.write() = Some(credential);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Failed to load stored credential");
                false
            }
        }
    }

    pub fn current(&self) -> Option<Credential> {
        self.inner.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .current
            .read()
            .as_ref()
            .map(|c| c.is_structurally_valid())
            .unwrap_or(false)
    }

    /// Install a token obtained out of band (explicit login).
    pub fn set(&self, token: impl Into<String>) -> Result<Credential, ApiError> {
        let token = token.into();
        if !is_structurally_valid(&token) {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "Token is not a three-segment bearer token",
            ));
        }
        let credential = Credential::new(token);
        Self::install(&self.inner, &credential);
        Ok(credential)
    }

    /// Logout: forget the credential, its stored copy, and the refresh cool-down.
    pub fn clear(&self) {
        *self.inner.current.write() = None;
        {
            let mut state = self.inner.refresh.lock();
            state.last_attempt = None;
            state.generation += 1;
        }
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored credential");
        }
        info!("Credential cleared");
    }

    /// Obtain a fresh credential.
    ///
    /// Joins a refresh already in flight. Otherwise returns `None` without any
    /// network call when the previous attempt started less than the cool-down
    /// ago, and starts a new refresh when it didn't.
    pub async fn acquire(&self) -> Option<Credential> {
        let pending = {
            let mut state = self.inner.refresh.lock();
            match state.in_flight.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight credential refresh");
                    pending.clone()
                }
                None => {
                    let now = Instant::now();
                    if let Some(last) = state.last_attempt {
                        if now.duration_since(last) < self.cooldown {
                            debug!(
                                since_ms = now.duration_since(last).as_millis() as u64,
                                "Credential refresh cooling down"
                            );
                            return None;
                        }
                    }
                    state.last_attempt = Some(now);
                    let pending = Self::refresh(Arc::clone(&self.inner), state.generation)
                        .boxed()
                        .shared();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    async fn refresh(inner: Arc<Inner>, generation: u64) -> Option<Credential> {
        let outcome = inner.source.fetch_token().await;

        let credential = match outcome {
            Ok(token) if is_structurally_valid(&token) => Some(Credential::new(token)),
            Ok(_) => {
                warn!("Auth endpoint returned a malformed token");
                None
            }
            Err(e) => {
                warn!(code = %e.code, status = ?e.status, "Credential refresh failed: {}", e.message);
                None
            }
        };

        let still_current = {
            let mut state = inner.refresh.lock();
            state.in_flight = None;
            state.generation == generation
        };

        match credential {
            Some(credential) if still_current => {
                Self::install(&inner, &credential);
                info!("Credential refreshed");
                Some(credential)
            }
            Some(_) => {
                debug!("Discarding credential refreshed across a logout");
                None
            }
            None => None,
        }
    }

    fn install(inner: &Inner, credential: &Credential) {
        *inner.current.write() = Some(credential.clone());
        if let Err(e) = inner.store.save(credential) {
            warn!(error = %e, "Failed to persist credential");
        }
    }
}
