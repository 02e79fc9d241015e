//! Delivery state machine for one batch.
//!
//! ```text
//! Idle -> Sending -> Success
//!            |  ^
//!            v  |
//!         RetryWait
//!            |
//!            v
//!      PermanentFailure
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::{config::duration_str, exporter::Delivery};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MULTIPLIER: u32 = 2;
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per batch, the first one included.
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub initial_backoff: Duration,
    pub multiplier: u32,
    #[serde(with = "duration_str")]
    pub max_backoff: Duration,
}
impl RetryPolicy {
    /// Wait after the `failures`-th transient failure.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(failures.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Rejected(String),
    RetriesExhausted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Sending { attempt: u32 },
    RetryWait { attempt: u32, delay: Duration },
    Success { attempts: u32 },
    PermanentFailure { attempts: u32, cause: FailureCause },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Delivered(Delivery),
    /// The backoff delay has passed.
    Elapsed,
}

impl SendState {
    /// Events that do not apply to the current state leave it unchanged.
    pub fn next(self, event: Event, policy: &RetryPolicy) -> SendState {
        match (self, event) {
            (Self::Idle, Event::Start) => Self::Sending { attempt: 1 },
            (Self::Sending { attempt }, Event::Delivered(delivery)) => match delivery {
                Delivery::Accepted => Self::Success { attempts: attempt },
                Delivery::Rejected(reason) => Self::PermanentFailure {
                    attempts: attempt,
                    cause: FailureCause::Rejected(reason),
                },
                Delivery::Transient(reason) if attempt >= policy.max_attempts => {
                    Self::PermanentFailure {
                        attempts: attempt,
                        cause: FailureCause::RetriesExhausted(reason),
                    }
                }
                Delivery::Transient(_) => Self::RetryWait {
                    attempt,
                    delay: policy.backoff(attempt),
                },
            },
            (Self::RetryWait { attempt, .. }, Event::Elapsed) => Self::Sending {
                attempt: attempt + 1,
            },
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::PermanentFailure { .. })
    }
}
