//! # Task-derived utilities.
//!
//! Every utility here is written against [`TaskHandle`](crate::TaskHandle)
//! only, takes the [`Lifetime`](crate::Lifetime) that bounds its watchers and
//! stops as soon as that lifetime is disposed.
//!
//! - [`ErrorRetry`] re-runs a task after failures
//! - [`DelayedPending`] / [`DelayedTask`] hide `Pending` for fast operations
//! - [`LastResult`] / [`StaleState`] remember past settlements
//! - [`on_success`] / [`on_error`] fire side effects on settlements

mod hooks;
mod pending;
mod retry;
mod stale;

pub use hooks::{on_error, on_success};
pub use pending::{DelayedPending, DelayedTask};
pub use retry::ErrorRetry;
pub use stale::{LastResult, StaleSnapshot, StaleState};
