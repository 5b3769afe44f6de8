//! # Event subscribers.
//!
//! Everything published on a runtime's [`Bus`](crate::Bus) is fanned out to
//! the registered subscribers by a [`SubscriberSet`]; each one gets its own
//! bounded queue and worker.
//!
//! ```text
//! Task / Retry / Scope ── publish ──► Bus ──► subscriber_listener
//!                                               ├──► InFlightTracker
//!                                               └──► SubscriberSet ──► LogWriter, custom...
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
