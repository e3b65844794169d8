//! Failure notification for decoupled observers.
//!
//! The client publishes every unrecovered error to its [`FailureBus`].
//! Subscribers (a notification surface, a log, a test recorder) react without
//! being coupled to any call site.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ApiError;

/// Where a failure came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub method: String,
    pub path: String,
    pub request_id: String,
}

pub trait FailureObserver: Send + Sync {
    /// Called synchronously from the failing call; keep it cheap.
    fn on_failure(&self, error: &ApiError, context: &FailureContext);
}

/// Identifies a subscription for [`FailureBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn FailureObserver>)>>,
    next_id: AtomicU64,
}

/// Fan-out of normalized failures. Clone shares the subscriber list.
#[derive(Clone, Default)]
pub struct FailureBus {
    inner: Arc<BusInner>,
}

impl FailureBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn FailureObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.write().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.inner.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    pub fn publish(&self, error: &ApiError, context: &FailureContext) {
        // Snapshot so observers may (un)subscribe from inside the callback.
        let observers: Vec<Arc<dyn FailureObserver>> = self
            .inner
            .observers
            .read()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.on_failure(error, context);
        }
    }
}

/// Logs every failure as a generic "Request failed" notification.
#[derive(Debug, Default)]
pub struct LogObserver;

impl FailureObserver for LogObserver {
    fn on_failure(&self, error: &ApiError, context: &FailureContext) {
        warn!(
            code = %error.code,
            status = ?error.status,
            method = %context.method,
            path = %context.path,
            request_id = %context.request_id,
            "Request failed: {}",
            error.message
        );
    }
}

/// Forwards failures into a bounded channel. Drops on overflow.
pub struct ChannelObserver {
    tx: mpsc::Sender<(ApiError, FailureContext)>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(ApiError, FailureContext)>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl FailureObserver for ChannelObserver {
    fn on_failure(&self, error: &ApiError, context: &FailureContext) {
        if let Err(e) = self.tx.try_send((error.clone(), context.clone())) {
            debug!(error = %e, "Failure channel full or closed, dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorCode;

    fn ctx() -> FailureContext {
        FailureContext {
            method: "GET".to_string(),
            path: "/v1/health".to_string(),
            request_id: "req-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_observer_receives_published_errors() {
        let bus = FailureBus::new();
        let (observer, mut rx) = ChannelObserver::new(4);
        bus.subscribe(Arc::new(observer));

        bus.publish(&ApiError::new(ErrorCode::NotFound, "gone"), &ctx());

        let (error, context) = rx.recv().await.expect("notification");
        assert_eq!(error.code, ErrorCode::NotFound);
        assert_eq!(context.path, "/v1/health");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = FailureBus::new();
        let (observer, mut rx) = ChannelObserver::new(4);
        let id = bus.subscribe(Arc::new(observer));
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&ApiError::new(ErrorCode::Internal, "boom"), &ctx());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_drops_on_overflow() {
        let bus = FailureBus::new();
        let (observer, mut rx) = ChannelObserver::new(1);
        bus.subscribe(Arc::new(observer));

        bus.publish(&ApiError::new(ErrorCode::Internal, "first"), &ctx());
        bus.publish(&ApiError::new(ErrorCode::Internal, "second"), &ctx());

        let (first, _) = rx.try_recv().expect("first notification");
        assert_eq!(first.message, "first");
        assert!(rx.try_recv().is_err());
    }
}
