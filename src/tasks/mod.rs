//! # Tasks: cancellable operations and their observable state.
//!
//! This module provides the core task-related types:
//! - [`Operation`] - trait for the async work a task runs (closures implement it)
//! - [`RunContext`] - per-run cancellation and abort-hook registration
//! - [`Task`] - one operation, at most one run in flight, observable state
//! - [`TaskState`] / [`RunResult`] - tagged state and per-run outcome
//! - [`TaskHandle`] - the contract utilities are written against

mod context;
mod handle;
mod operation;
mod state;
mod task;

pub use context::RunContext;
pub use handle::{RunFuture, TaskHandle};
pub use operation::{Operation, OperationRef};
pub use state::{RunResult, StateKind, TaskState};
pub use task::Task;
