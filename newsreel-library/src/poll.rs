//! Polling a status until it settles

use std::time::Duration;

/// Result of one check
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T> {
    Ready(T),
    Pending,
    Failed(String),
}

/// Terminal outcome of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    Failed(String),
    Timeout { attempts: u32 },
}

/// Fixed-interval poller with an attempt budget
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

impl Poller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Call `check` until it settles or the budget runs out.
    ///
    /// Errors from `check` abort the poll immediately.
    pub fn run<T, E>(
        &self,
        mut check: impl FnMut(u32) -> Result<PollStep<T>, E>,
    ) -> Result<PollOutcome<T>, E> {
        for attempt in 1..=self.max_attempts {
            match check(attempt)? {
                PollStep::Ready(value) => return Ok(PollOutcome::Ready(value)),
                PollStep::Failed(reason) => return Ok(PollOutcome::Failed(reason)),
                PollStep::Pending => {
                    tracing::trace!(attempt, max = self.max_attempts, "Still pending");
                    if attempt < self.max_attempts {
                        std::thread::sleep(self.interval);
                    }
                }
            }
        }
        Ok(PollOutcome::Timeout {
            attempts: self.max_attempts,
        })
    }
}
