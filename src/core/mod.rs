//! Runtime core: configuration, event delivery and shutdown.
//!
//! The public API from this module is [`Runtime`] (with its [`RuntimeBuilder`])
//! and [`Config`]. Internal modules:
//! - [`runtime`]: root lifetime, subscriber listener, graceful shutdown;
//! - [`builder`]: wires bus, subscribers and tracker together;
//! - [`in_flight`]: which tasks have a run in flight, for shutdown reports.

mod builder;
mod config;
mod in_flight;
mod runtime;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use in_flight::InFlightTracker;
pub use runtime::Runtime;
