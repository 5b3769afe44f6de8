//! # Retry policy for failed runs.
//!
//! [`RetryPolicy`] bounds how often [`ErrorRetry`](crate::ErrorRetry) re-runs a
//! task after an error and how long it waits in between.
//!
//! ```text
//! RetryPolicy { count: Some(3), backoff }  → at most 3 retries, then stop
//! RetryPolicy { count: None, backoff }     → retry until a success or reset
//! ```

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// How many retries to attempt and how far apart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum retries since the last reset; `None` means unlimited.
    pub count: Option<u32>,
    /// Interval schedule between retries.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Three retries with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            count: Some(3),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// `count` retries, `interval` apart.
    pub fn new(count: u32, interval: Duration) -> Self {
        Self {
            count: Some(count),
            backoff: BackoffPolicy::constant(interval),
        }
    }

    /// Retries forever with the given schedule.
    pub fn unlimited(backoff: BackoffPolicy) -> Self {
        Self {
            count: None,
            backoff,
        }
    }

    /// Returns a copy with a different schedule.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// True if another retry is allowed after `done` retries.
    #[inline]
    pub fn allows(&self, done: u32) -> bool {
        self.count.is_none_or(|max| done < max)
    }
}
