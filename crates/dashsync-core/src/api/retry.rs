use std::time::Duration;

/// Maximum number of retries for transient failures.
/// 3 retries cover short outages (250 + 500 + 1000 ms) without stalling a poll cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 250;

/// Exponential backoff for side-effect-free requests: `base * 2^attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration) -> Self {
        Self { max_retries, base }
    }

    /// Whether a request that has already spent `attempt` retries may retry again.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.base.saturating_mul(multiplier)
    }
}
