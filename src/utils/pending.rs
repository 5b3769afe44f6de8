//! # Delayed pending: hide spinners for fast operations.
//!
//! - [`DelayedPending`] is a boolean that turns true only once a task has been
//!   pending for longer than `delay`, and turns false the moment it settles.
//! - [`DelayedTask`] applies the same rule to a whole task: its own state shows
//!   `Pending` only after the delay (keeping the previous state until then) and
//!   passes every other state through unchanged.
//!
//! ```text
//! task:     Uninit ── Pending ───────────────── Ok
//! delayed:  false  ── false ──(delay)── true ── false
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::core::Config;
use crate::scope::Lifetime;
use crate::tasks::{RunFuture, RunResult, TaskHandle, TaskState};

/// Waits until `rx` stops being pending or `delay` elapses.
///
/// Returns `Some(true)` if the delay elapsed with the task still pending and
/// `None` once the task is gone.
async fn outlasts<T, E>(
    rx: &mut watch::Receiver<TaskState<T, E>>,
    delay: Duration,
) -> Option<bool> {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return Some(rx.borrow().is_pending()),
            changed = rx.changed() => {
                changed.ok()?;
                if !rx.borrow_and_update().is_pending() {
                    return Some(false);
                }
            }
        }
    }
}

/// Boolean that is true only while a task has been pending longer than a delay.
#[derive(Clone)]
pub struct DelayedPending {
    value: Arc<watch::Sender<bool>>,
}

impl DelayedPending {
    /// Tracks `task` until `lifetime` is disposed.
    pub fn new<H: TaskHandle>(lifetime: &Lifetime, task: &H, delay: Duration) -> Self {
        let value = Arc::new(watch::Sender::new(false));
        let out = value.clone();
        let mut rx = task.subscribe();

        lifetime.spawn(async move {
            loop {
                let pending = rx.borrow_and_update().is_pending();
                if pending && !*out.borrow() {
                    match outlasts(&mut rx, delay).await {
                        Some(true) => {
                            out.send_replace(true);
                        }
                        Some(false) => {}
                        None => break,
                    }
                    continue;
                }
                if !pending {
                    out.send_if_modified(|v| std::mem::replace(v, false));
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
            out.send_if_modified(|v| std::mem::replace(v, false));
        });
        Self { value }
    }

    /// Same as [`DelayedPending::new`] with [`Config::pending_delay`].
    pub fn with_defaults<H: TaskHandle>(lifetime: &Lifetime, task: &H, cfg: &Config) -> Self {
        Self::new(lifetime, task, cfg.pending_delay)
    }

    pub fn get(&self) -> bool {
        *self.value.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.value.subscribe()
    }
}

/// Task wrapper whose state only reports `Pending` after a delay.
pub struct DelayedTask<H: TaskHandle> {
    task: H,
    state: Arc<watch::Sender<TaskState<H::Value, H::Error>>>,
}

impl<H: TaskHandle> Clone for DelayedTask<H> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
            state: self.state.clone(),
        }
    }
}

impl<H: TaskHandle> DelayedTask<H> {
    /// Wraps `task` until `lifetime` is disposed.
    pub fn new(lifetime: &Lifetime, task: H, delay: Duration) -> Self {
        let initial = match task.state() {
            TaskState::Pending => TaskState::Uninit,
            other => other,
        };
        let state = Arc::new(watch::Sender::new(initial));
        let out = state.clone();
        let mut rx = task.subscribe();

        lifetime.spawn(async move {
            loop {
                let current = rx.borrow_and_update().clone();
                if current.is_pending() {
                    if !out.borrow().is_pending() {
                        match outlasts(&mut rx, delay).await {
                            Some(true) => {
                                out.send_replace(TaskState::Pending);
                            }
                            Some(false) => continue,
                            None => break,
                        }
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                out.send_replace(current);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        Self { task, state }
    }

    /// The wrapped task.
    pub fn inner(&self) -> &H {
        &self.task
    }
}

impl<H: TaskHandle> TaskHandle for DelayedTask<H> {
    type Value = H::Value;
    type Error = H::Error;

    fn name(&self) -> &str {
        self.task.name()
    }

    fn run(&self) -> RunFuture<H::Value, H::Error> {
        self.task.run()
    }

    fn abort(&self) {
        self.task.abort()
    }

    fn state(&self) -> TaskState<H::Value, H::Error> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<TaskState<H::Value, H::Error>> {
        self.state.subscribe()
    }

    fn settlements(&self) -> broadcast::Receiver<RunResult<H::Value, H::Error>> {
        self.task.settlements()
    }
}
