use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

type RunFn = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

/// A keyed unit of recurring work.
///
/// `run` produces a fresh future per tick. Failures are expected to be recorded
/// by the work itself (usually into a cache entry), so the future yields `()`.
#[derive(Clone)]
pub struct PollTask {
    key: String,
    interval: Duration,
    run: Arc<RunFn>,
}

impl PollTask {
    pub fn new<F, Fut>(key: impl Into<String>, interval: Duration, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            key: key.into(),
            interval: interval.max(Duration::from_millis(1)),
            run: Arc::new(move || run().boxed()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn run(&self) -> BoxFuture<'static, ()> {
        (self.run)()
    }
}

impl fmt::Debug for PollTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollTask")
            .field("key", &self.key)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
