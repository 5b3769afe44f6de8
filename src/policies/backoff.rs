//! # Interval between automatic retries.
//!
//! [`BackoffPolicy`] turns a retry number into a wait. The plain "retry every
//! 100ms" case is [`BackoffPolicy::constant`]; growth is opt-in through
//! [`BackoffPolicy::exponential`].
//!
//! The interval for retry `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`, then jitter is applied. The base is derived from `n` alone so that
//! jitter never feeds back into later intervals.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use taskscope::BackoffPolicy;
//!
//! let every_100ms = BackoffPolicy::constant(Duration::from_millis(100));
//! assert_eq!(every_100ms.next(0), Duration::from_millis(100));
//! assert_eq!(every_100ms.next(7), Duration::from_millis(100));
//!
//! let growing = BackoffPolicy::exponential(
//!     Duration::from_millis(100),
//!     2.0,
//!     Duration::from_secs(1),
//! );
//! assert_eq!(growing.next(1), Duration::from_millis(200));
//! assert_eq!(growing.next(10), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry interval policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Interval before the first retry.
    pub first: Duration,
    /// Upper bound for any interval.
    pub max: Duration,
    /// Multiplicative growth per retry (`1.0` = constant).
    pub factor: f64,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 100ms, capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Same interval before every retry.
    pub fn constant(interval: Duration) -> Self {
        Self {
            first: interval,
            max: interval,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// `first × factor^n`, never above `max`.
    pub fn exponential(first: Duration, factor: f64, max: Duration) -> Self {
        Self {
            first,
            max,
            factor,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns a copy with the given jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the interval before retry number `retry` (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to `max`.
    pub fn next(&self, retry: u32) -> Duration {
        if retry == 0 || self.factor == 1.0 {
            return self.jitter.apply(self.first.min(self.max));
        }
        let max_secs = self.max.as_secs_f64();
        let exp = retry.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_constant_100ms() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(5), Duration::from_millis(100));
    }

    #[test]
    fn exponential_growth_then_cap() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(50), 2.0, Duration::from_millis(300));
        assert_eq!(policy.next(0), Duration::from_millis(50));
        assert_eq!(policy.next(1), Duration::from_millis(100));
        assert_eq!(policy.next(2), Duration::from_millis(200));
        assert_eq!(policy.next(3), Duration::from_millis(300));
    }

    #[test]
    fn first_above_max_clamps() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn overflow_clamps_to_max() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(10));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn jitter_never_exceeds_base() {
        let policy = BackoffPolicy::constant(Duration::from_millis(400))
            .with_jitter(JitterPolicy::Full);
        for retry in 0..50 {
            assert!(policy.next(retry) <= Duration::from_millis(400));
        }
    }
}
