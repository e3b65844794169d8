use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::PollTask;

/// Whether the dashboard is currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Default)]
struct PollerState {
    timers: HashMap<String, JoinHandle<()>>,
    running: HashSet<String>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<PollerState>,
    paused: AtomicBool,
}

impl Shared {
    /// One tick: dropped (not queued) while paused or while the key is still running.
    fn tick(self: &Arc<Self>, task: &PollTask) {
        if self.paused.load(Ordering::SeqCst) {
            trace!(key = task.key(), "Poll tick skipped: paused");
            return;
        }
        if !self.state.lock().running.insert(task.key().to_string()) {
            trace!(key = task.key(), "Poll tick skipped: previous run in progress");
            return;
        }

        let guard = RunningGuard {
            shared: Arc::clone(self),
            key: task.key().to_string(),
        };
        let run = task.run();
        tokio::spawn(async move {
            let _guard = guard;
            run.await;
        });
    }

    fn set_paused(&self, paused: bool) {
        if self.paused.swap(paused, Ordering::SeqCst) != paused {
            debug!(paused, "Polling {}", if paused { "paused" } else { "resumed" });
        }
    }
}

/// Clears the running flag when a run finishes (or its task is torn down).
struct RunningGuard {
    shared: Arc<Shared>,
    key: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.shared.state.lock().running.remove(&self.key);
    }
}

/// Schedules [`PollTask`]s on the Tokio runtime.
///
/// Stopping a task (or dropping the poller) cancels its timer only: a run that
/// is already in progress is left to finish.
pub struct Poller {
    shared: Arc<Shared>,
    auto_pause: bool,
    visibility: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    pub fn new() -> Self {
        Self::with_auto_pause(true)
    }

    /// `auto_pause` controls whether [`Poller::follow_visibility`] has any effect.
    pub fn with_auto_pause(auto_pause: bool) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            auto_pause,
            visibility: Mutex::new(None),
        }
    }

    /// Run `task` now and then every `task.interval()`.
    ///
    /// Returns `false` without doing anything if the key is already scheduled.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, task: PollTask) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.timers.contains_key(task.key()) {
                return false;
            }

            let shared = Arc::clone(&self.shared);
            let timer_task = task.clone();
            let period = task.interval();
            let timer = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    shared.tick(&timer_task);
                }
            });
            state.timers.insert(task.key().to_string(), timer);
        }
        debug!(key = task.key(), interval_ms = task.interval().as_millis() as u64, "Poll task started");

        self.shared.tick(&task);
        true
    }

    /// Start each task; returns how many were newly scheduled.
    pub fn start_many<I>(&self, tasks: I) -> usize
    where
        I: IntoIterator<Item = PollTask>,
    {
        tasks.into_iter().filter(|t| self.start(t.clone())).count()
    }

    /// Cancel one task's schedule, or every schedule when `key` is `None`.
    pub fn stop(&self, key: Option<&str>) {
        let mut state = self.shared.state.lock();
        match key {
            Some(key) => {
                if let Some(timer) = state.timers.remove(key) {
                    timer.abort();
                    debug!(key, "Poll task stopped");
                }
            }
            None => {
                let count = state.timers.len();
                for (_, timer) in state.timers.drain() {
                    timer.abort();
                }
                if count > 0 {
                    debug!(count, "All poll tasks stopped");
                }
            }
        }
    }

    pub fn pause(&self) {
        self.shared.set_paused(true);
    }

    pub fn resume(&self) {
        self.shared.set_paused(false);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Pause while hidden and resume when visible again.
    ///
    /// Returns `false` (and ignores the channel) when auto-pause is disabled.
    /// Replaces any previously followed channel.
    pub fn follow_visibility(&self, mut visibility: watch::Receiver<Visibility>) -> bool {
        if !self.auto_pause {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        shared.set_paused(*visibility.borrow_and_update() == Visibility::Hidden);
        let handle = tokio::spawn(async move {
            while visibility.changed().await.is_ok() {
                let hidden = *visibility.borrow_and_update() == Visibility::Hidden;
                shared.set_paused(hidden);
            }
        });

        if let Some(previous) = self.visibility.lock().replace(handle) {
            previous.abort();
        }
        true
    }

    /// Keys with an active schedule, sorted.
    pub fn scheduled(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.state.lock().timers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.shared.state.lock().timers.contains_key(key)
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.shared.state.lock().running.contains(key)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop(None);
        if let Some(handle) = self.visibility.lock().take() {
            handle.abort();
        }
    }
}
