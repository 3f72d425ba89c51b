//! Bounded retry policy for chain confirmation polling.
//!
//! An explicit value instead of a sleep loop scattered through the verifier,
//! so the budget is visible in one place and tests can shrink it.

use std::time::Duration;

/// Polling budget: `max_attempts` probes, `delay` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Total worst-case wall time spent sleeping (no delay after the final
    /// attempt).
    pub fn max_wait(&self) -> Duration {
        self.delay * (self.max_attempts - 1)
    }
}

/// 5 attempts, 2 seconds apart — ≤10s before a timeout verdict.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}
