//! Bounded retry for collaborator I/O.

use std::fmt::Display;
use std::time::Duration;

use tracing::warn;

use crate::error::Retryable;

/// Capped retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled on each further attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Policy that never sleeps, for tests and in-memory collaborators.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what,
                        attempt + 1,
                        attempts,
                        e
                    );
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff.saturating_mul(2u32.saturating_pow(attempt)));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
