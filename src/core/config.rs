//! # Runtime configuration.
//!
//! [`Config`] is used in two ways:
//! 1. **Runtime creation**: `Runtime::builder(config).build()`
//! 2. **Utility defaults**: `ErrorRetry::with_defaults(.., &config)`,
//!    `DelayedPending::with_defaults(.., &config)`

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Global configuration for the taskscope runtime.
///
/// ## Field semantics
/// - `grace`: maximum wait for spawned runs and watchers on shutdown (`0s` = don't wait)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `retry`: default retry policy for [`ErrorRetry`](crate::ErrorRetry)
/// - `pending_delay`: default delay for [`DelayedPending`](crate::DelayedPending)
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for graceful shutdown.
    ///
    /// On shutdown the root lifetime is disposed and the runtime waits up to
    /// `grace` for everything it spawned; past that it returns
    /// `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Receivers lagging more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,

    /// Default retry policy.
    pub retry: RetryPolicy,

    /// Default delay before a pending task is reported as pending.
    pub pending_delay: Duration,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 60s`
    /// - `bus_capacity = 1024`
    /// - `retry = RetryPolicy::default()` (3 retries, 100ms apart)
    /// - `pending_delay = 200ms`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            bus_capacity: 1024,
            retry: RetryPolicy::default(),
            pending_delay: Duration::from_millis(200),
        }
    }
}
