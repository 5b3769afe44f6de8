//! Retry policies.
//!
//! This module groups the knobs that control **whether** a failed run is
//! retried and **how long** to wait before doing so.
//!
//! ## Contents
//! - [`RetryPolicy`]   how many retries (bounded or unlimited)
//! - [`BackoffPolicy`] how retry intervals evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization to avoid synchronized retries
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 3 retries.
//! - `BackoffPolicy::default()` → 100ms constant, max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
