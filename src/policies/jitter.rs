//! # Jitter for retry intervals.
//!
//! [`JitterPolicy`] randomizes retry intervals so that many tasks failing at the
//! same moment (a backend going down under a page full of widgets) do not all
//! retry on the same tick.
//!
//! - [`JitterPolicy::None`] — exact interval
//! - [`JitterPolicy::Full`] — uniform in `[0, interval]`
//! - [`JitterPolicy::Equal`] — `interval/2 + uniform[0, interval/2]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed retry interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the interval as computed.
    #[default]
    None,
    /// Uniform delay in `[0, interval]`.
    Full,
    /// Half the interval plus a uniform share of the other half.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given interval.
    pub fn apply(&self, interval: Duration) -> Duration {
        let ms = interval.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return interval;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => interval,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 { 0 } else { rng.random_range(0..=half) };
                Duration::from_millis(half + extra)
            }
        }
    }
}
