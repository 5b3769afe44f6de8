//! # ErrorRetry: re-run a task after it fails.
//!
//! Listens to a task's settlements and schedules `run()` after each error,
//! following a [`RetryPolicy`].
//!
//! ```text
//! settlement
//!   ├─ Ok       ─► count = 0 (RetryReset if it was > 0)
//!   ├─ Aborted  ─► ignored
//!   └─ Err(e)   ─► count < max ? ─ yes ─► count += 1, RetryScheduled,
//!                                          sleep(backoff.next(count-1)),
//!                                          run() if the task is still in Err
//!                                 └ no ──► RetryExhausted
//! ```
//!
//! ## Rules
//! - A scheduled retry is skipped if the task left the error state meanwhile
//!   (someone re-ran it by hand).
//! - [`reset`](ErrorRetry::reset) zeroes the counter and cancels a scheduled retry.
//! - Disposing the lifetime cancels the timer; no retry fires afterwards.

use std::sync::Arc;

use tokio::sync::{Notify, broadcast, watch};

use crate::core::Config;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryPolicy;
use crate::scope::Lifetime;
use crate::tasks::{RunResult, TaskHandle};

struct RetryInner {
    name: Arc<str>,
    policy: RetryPolicy,
    count: watch::Sender<u32>,
    reset: Notify,
    bus: Bus,
}

impl RetryInner {
    fn reset(&self) {
        let was = self.count.send_replace(0);
        if was != 0 {
            self.bus
                .publish(Event::new(EventKind::RetryReset).with_task(self.name.clone()));
        }
    }
}

/// Automatic retry of failed runs with an observable retry count.
#[derive(Clone)]
pub struct ErrorRetry {
    inner: Arc<RetryInner>,
}

impl ErrorRetry {
    /// Starts retrying `task`'s failures until `lifetime` is disposed.
    pub fn new<H: TaskHandle>(lifetime: &Lifetime, task: &H, policy: RetryPolicy) -> Self {
        let inner = Arc::new(RetryInner {
            name: task.name().into(),
            policy,
            count: watch::Sender::new(0),
            reset: Notify::new(),
            bus: lifetime.bus().clone(),
        });

        let settled = task.settlements();
        lifetime.spawn(retry_loop(inner.clone(), task.clone(), settled));
        Self { inner }
    }

    /// Same as [`ErrorRetry::new`] with [`Config::retry`].
    pub fn with_defaults<H: TaskHandle>(lifetime: &Lifetime, task: &H, cfg: &Config) -> Self {
        Self::new(lifetime, task, cfg.retry)
    }

    /// Retries performed since the last success or reset.
    pub fn count(&self) -> u32 {
        *self.inner.count.borrow()
    }

    /// True when the policy allows no further retries.
    pub fn is_exhausted(&self) -> bool {
        !self.inner.policy.allows(self.count())
    }

    /// Watch channel over the retry count.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.inner.count.subscribe()
    }

    /// Zeroes the counter and cancels a scheduled retry.
    pub fn reset(&self) {
        self.inner.reset();
        self.inner.reset.notify_waiters();
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }
}

async fn retry_loop<H: TaskHandle>(
    inner: Arc<RetryInner>,
    task: H,
    mut settled: broadcast::Receiver<RunResult<H::Value, H::Error>>,
) {
    loop {
        let result = match settled.recv().await {
            Ok(result) => result,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(task = %inner.name, skipped, "retry fell behind task settlements");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let error = match result {
            RunResult::Ok(_) => {
                inner.reset();
                continue;
            }
            RunResult::Aborted => continue,
            RunResult::Err(e) => e,
        };

        let done = *inner.count.borrow();
        if !inner.policy.allows(done) {
            inner.bus.publish(
                Event::new(EventKind::RetryExhausted)
                    .with_task(inner.name.clone())
                    .with_attempt(done)
                    .with_reason(format!("{error:?}")),
            );
            continue;
        }

        let delay = inner.policy.backoff.next(done);
        inner.count.send_replace(done + 1);
        inner.bus.publish(
            Event::new(EventKind::RetryScheduled)
                .with_task(inner.name.clone())
                .with_attempt(done + 1)
                .with_delay(delay)
                .with_reason(format!("{error:?}")),
        );

        let cancelled = inner.reset.notified();
        tokio::pin!(cancelled);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if task.state().error().is_some() {
                    let _ = task.run();
                }
            }
            _ = &mut cancelled => {}
        }
    }
}
