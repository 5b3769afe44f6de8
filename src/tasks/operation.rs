//! # Operation: the async work a task runs.
//!
//! An [`Operation`] produces one fresh future per run. Any
//! `Fn(RunContext) -> impl Future<Output = Result<T, E>>` closure is an
//! operation; implement the trait by hand when the work carries its own
//! configuration (clients, URLs) and reads nicer as a struct.
//!
//! ## Concurrency semantics
//! - Each run calls the operation **again**; no state is shared between runs
//!   unless the implementor shares it explicitly (`Arc<...>`).
//! - `Fn`, not `FnMut`: a superseded run may still be unwinding while the next
//!   one starts.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use taskscope::{Operation, RunContext};
//!
//! struct FetchUser {
//!     id: u32,
//! }
//!
//! #[async_trait]
//! impl Operation<String, std::io::Error> for FetchUser {
//!     async fn call(&self, ctx: RunContext) -> Result<String, std::io::Error> {
//!         if ctx.is_aborted() {
//!             return Ok(String::new());
//!         }
//!         Ok(format!("user-{}", self.id))
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::tasks::context::RunContext;

/// Shared handle to an operation.
pub type OperationRef<T, E> = Arc<dyn Operation<T, E>>;

/// # One repeatable, cancellable unit of async work.
#[async_trait]
pub trait Operation<T, E>: Send + Sync + 'static {
    /// Executes one run.
    ///
    /// Implementations should watch [`RunContext::aborted`] at long waits; an
    /// aborted run's result is discarded either way.
    async fn call(&self, ctx: RunContext) -> Result<T, E>;
}

#[async_trait]
impl<F, Fut, T, E> Operation<T, E> for F
where
    F: Fn(RunContext) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    async fn call(&self, ctx: RunContext) -> Result<T, E> {
        (self)(ctx).await
    }
}
