//! # Conflict Retry
//!
//! Operations that run inside a store transaction restart from scratch when
//! the commit loses to a concurrent writer.
//!
//! ```text
//! attempt 1 ──► Conflict ──► sleep ~initial ──► attempt 2 ──► Conflict
//!           ──► sleep ~initial×2 ──► attempt 3 ──► Ok(value, attempts = 3)
//!
//! attempt max_attempts ──► Conflict ──► Err(Conflict { attempts: max_attempts })
//! ```
//!
//! Anything other than a conflict ends the loop immediately.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};

/// How often and how patiently to retry a conflicted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 5
    pub max_attempts: u32,

    /// Default: 10ms
    pub initial_backoff: Duration,

    /// Default: 200ms
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Retries without sleeping. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts).with_backoff(Duration::ZERO, Duration::ZERO)
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        // Start from `initial_interval` rather than the crate default.
        backoff.reset();
        backoff
    }

    /// Runs `attempt` until it succeeds, fails with something other than a
    /// conflict, or `max_attempts` is reached.
    ///
    /// Each attempt receives its 1-based number. On success returns the
    /// value and the number of attempts used.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> ServiceResult<(T, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut backoff = self.backoff();
        let mut number = 1;

        loop {
            match attempt(number).await {
                Ok(value) => return Ok((value, number)),
                Err(e) if e.is_conflict() => {
                    if number >= self.max_attempts {
                        warn!(operation, attempts = number, "Giving up after repeated conflicts");
                        return Err(ServiceError::Conflict { attempts: number });
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.max_backoff);
                    warn!(operation, attempt = number, ?delay, "Conflict, retrying");
                    tokio::time::sleep(delay).await;
                    number += 1;
                }
                Err(e) => {
                    debug!(operation, attempt = number, error = %e, "Attempt failed");
                    return Err(e);
                }
            }
        }
    }
}
