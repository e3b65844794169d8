//! Periodic refresh of dashboard data.
//!
//! A [`PollTask`] names a unit of work and how often it repeats; the
//! [`Poller`] runs it once immediately and then on a fixed interval, never
//! letting two runs of the same key overlap and skipping ticks while paused.

pub mod poller;
pub mod task;

pub use poller::{Poller, Visibility};
pub use task::PollTask;
