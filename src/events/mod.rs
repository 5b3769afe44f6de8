//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Task`, `ErrorRetry`, `Scope`, `DanglingScope`,
//!   `SubscriberSet` workers (overflow/panic), `Runtime` (shutdown).
//! - **Consumers**: `Runtime::subscriber_listener()` (fans out to `SubscriberSet`
//!   and updates `InFlightTracker`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
