//! # taskscope
//!
//! **Taskscope** models async work as cancellable, repeatable tasks with
//! observable state, and ties their lifetime to reactive scopes.
//!
//! A [`Task`] wraps one async operation. Running it again aborts the run in
//! flight; its [`TaskState`] is always one of `Uninit`, `Pending`, `Ok`, `Err`
//! or `Aborted`. Utilities ([`ErrorRetry`], [`DelayedPending`], [`StaleState`],
//! ...) are written against the [`TaskHandle`] contract and stack on each
//! other. A [`Scope`] rebuilds tasks whenever its key changes and guarantees
//! the old ones are torn down first.
//!
//! ## Architecture
//! ```text
//!              Runtime (root Lifetime, Bus, SubscriberSet, InFlightTracker)
//!                 │
//!                 ├── Task ──────────────┐ publishes Run* events
//!                 ├── ErrorRetry(task) ──┤ publishes Retry* events
//!                 ├── Scope<K, R> ───────┤ publishes Scope* events
//!                 │     └─ child Lifetime per key
//!                 │          ├── Task
//!                 │          └── nested Scope ...
//!                 └── DanglingScope<R> ──┘ publishes Dangling* events
//!                                        ▼
//!                                       Bus ──► subscriber_listener ──► SubscriberSet
//!                                                      │                    ├─► LogWriter
//!                                                      ▼                    └─► custom
//!                                               InFlightTracker
//! ```
//!
//! ### Teardown
//! ```text
//! Lifetime::dispose()
//!   ├─► token.cancel()            → spawned watchers stop (retry timers, projections)
//!   └─► cleanups in reverse order → tasks abort + close, scopes deactivate,
//!                                   child lifetimes dispose recursively
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Tasks**         | One cancellable operation, one run in flight, tagged state.  | [`Task`], [`TaskState`], [`RunResult`]     |
//! | **Utilities**     | Retry, delayed pending, remembered results, hooks.           | [`ErrorRetry`], [`StaleState`], [`on_error`]|
//! | **Scopes**        | Keyed destroy-then-recreate and one-off detached instances.  | [`Scope`], [`DanglingScope`], [`Lifetime`] |
//! | **Policies**      | How often and how far apart retries happen.                  | [`RetryPolicy`], [`BackoffPolicy`]         |
//! | **Subscriber API**| Observe every run, retry and scope event.                    | [`Subscribe`], [`LogWriter`]               |
//! | **Runtime**       | Root lifetime, event fan-out and graceful shutdown.          | [`Runtime`], [`Config`]                    |
//! | **Errors**        | Typed errors for runtime, scopes and operations.             | [`RuntimeError`], [`ScopeError`], [`TaskError`] |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskscope::{Config, ErrorRetry, RunContext, RunResult, Runtime, Task, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = Runtime::builder(Config::default()).build();
//!
//!     let answer = Task::new(rt.lifetime(), "answer", |ctx: RunContext| async move {
//!         ctx.on_abort(|| println!("answer aborted"));
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!         Ok::<_, TaskError>(42)
//!     });
//!     let _retry = ErrorRetry::with_defaults(rt.lifetime(), &answer, rt.config());
//!
//!     assert_eq!(answer.run().await, RunResult::Ok(42));
//!
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod scope;
mod subscribers;
mod tasks;
mod utils;

// ---- Public re-exports ----

pub use crate::core::{Config, InFlightTracker, Runtime, RuntimeBuilder};
pub use error::{RuntimeError, ScopeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use scope::{DanglingScope, Dispose, Lifetime, Scope};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{
    Operation, OperationRef, RunContext, RunFuture, RunResult, StateKind, Task, TaskHandle,
    TaskState,
};
pub use utils::{
    DelayedPending, DelayedTask, ErrorRetry, LastResult, StaleSnapshot, StaleState, on_error,
    on_success,
};
