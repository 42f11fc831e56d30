//! Retry policy shared by the identity resolver and the bounded read
//! coordinator.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::SyncResult;
use crate::domain::models::{BackoffSchedule, RetryConfig};

/// Bounded retry with a configurable backoff schedule.
///
/// `max_attempts` counts every attempt including the first, so the default
/// policy tries twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub schedule: BackoffSchedule,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            schedule: BackoffSchedule::Exponential,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
        .with_schedule(config.schedule)
    }

    pub fn with_schedule(mut self, schedule: BackoffSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before the attempt following `attempt` (0-indexed).
    ///
    /// Exponential: `initial * 2^attempt`; linear: `initial * (attempt + 1)`;
    /// fixed: `initial`. Always capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.initial_backoff;
        let delay = match self.schedule {
            BackoffSchedule::Exponential => {
                initial.saturating_mul(2_u32.saturating_pow(attempt))
            }
            BackoffSchedule::Linear => initial.saturating_mul(attempt.saturating_add(1)),
            BackoffSchedule::Fixed => initial,
        };
        delay.min(self.max_backoff)
    }

    /// Sleep for the backoff following `attempt`.
    pub async fn pause(&self, attempt: u32) {
        let backoff = self.delay_for(attempt);
        if !backoff.is_zero() {
            sleep(backoff).await;
        }
    }

    /// Run `operation` until it yields a value or attempts run out.
    ///
    /// `Ok(None)` and non-fatal errors are retried; fatal errors
    /// ([`SyncError::is_fatal`](crate::domain::errors::SyncError::is_fatal))
    /// are returned immediately. Exhaustion is `Ok(None)`, not an error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> SyncResult<Option<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<Option<T>>>,
    {
        for attempt in 0..self.max_attempts {
            match operation(attempt).await {
                Ok(Some(value)) => {
                    if attempt > 0 {
                        debug!(label, attempt = attempt + 1, "succeeded after retry");
                    }
                    return Ok(Some(value));
                }
                Ok(None) => {
                    debug!(label, attempt = attempt + 1, "attempt produced nothing");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(label, attempt = attempt + 1, error = %err, "attempt failed");
                }
            }

            if attempt + 1 < self.max_attempts {
                self.pause(attempt).await;
            }
        }

        debug!(label, attempts = self.max_attempts, "retries exhausted");
        Ok(None)
    }
}
