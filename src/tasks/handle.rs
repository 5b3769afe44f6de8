//! # The task contract utilities are written against.
//!
//! [`TaskHandle`] is everything a utility may assume about a task: it can be
//! run and aborted, its state can be read and watched, and every settlement
//! is broadcast. [`Task`](crate::Task) implements it, and so do wrappers such
//! as [`DelayedTask`](crate::DelayedTask), which makes the utilities stack.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{broadcast, oneshot, watch};

use crate::tasks::state::{RunResult, TaskState};

/// Future resolving to the outcome of one run.
///
/// The run proceeds whether or not this future is polled; dropping it only
/// discards the notification.
#[must_use = "the run proceeds regardless; await this to observe its result"]
pub struct RunFuture<T, E> {
    rx: oneshot::Receiver<RunResult<T, E>>,
}

impl<T, E> RunFuture<T, E> {
    pub(crate) fn new(rx: oneshot::Receiver<RunResult<T, E>>) -> Self {
        Self { rx }
    }

    /// A future that is already settled as aborted.
    pub(crate) fn aborted() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(RunResult::Aborted);
        Self { rx }
    }
}

impl<T, E> Future for RunFuture<T, E> {
    type Output = RunResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the task itself went away mid-run.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(RunResult::Aborted))
    }
}

/// Contract shared by tasks and task-shaped wrappers.
pub trait TaskHandle: Clone + Send + Sync + 'static {
    /// Success value of a run.
    type Value: Clone + Send + Sync + 'static;
    /// Failure value of a run.
    type Error: Clone + fmt::Debug + Send + Sync + 'static;

    /// Stable, human-readable name.
    fn name(&self) -> &str;

    /// Starts a new run, aborting the one in flight.
    fn run(&self) -> RunFuture<Self::Value, Self::Error>;

    /// Aborts the run in flight, if any.
    fn abort(&self);

    /// Snapshot of the current state.
    fn state(&self) -> TaskState<Self::Value, Self::Error>;

    /// Watch channel over the state; intermediate states may be coalesced.
    fn subscribe(&self) -> watch::Receiver<TaskState<Self::Value, Self::Error>>;

    /// Every settlement of every run, in order.
    fn settlements(&self) -> broadcast::Receiver<RunResult<Self::Value, Self::Error>>;
}
