//! Bounded retry with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule: attempt `n` (1-based) waits `base_delay * 2^(n-2)` before
/// it runs, capped at `max_delay`. The first attempt never waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Retries back-to-back. Used by tests and the paper exchange.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last result together with the number of attempts made.
    pub fn run<T, E>(
        &self,
        is_transient: impl Fn(&E) -> bool,
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> (Result<T, E>, u32) {
        let mut attempt = 1;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            match op(attempt) {
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    attempt += 1;
                }
                result => return (result, attempt),
            }
        }
    }
}
