//! # LogWriter: events as `tracing` records
//!
//! Renders every [`Event`] as one structured record under the
//! `taskscope::events` target. Failures and subscriber health go out at
//! `warn`/`error`, run lifecycle at `debug`, the rest at `info`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG taskscope::events: run starting task="load-user" run=1
//!  WARN taskscope::events: run failed task="load-user" run=1 reason="timeout"
//!  INFO taskscope::events: retry scheduled task="load-user" attempt=1 delay_ms=100
//!  INFO taskscope::events: scope activated scope="user-panel"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "taskscope::events";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::RunStarting => {
                tracing::debug!(target: TARGET, task, run = e.run, "run starting");
            }
            EventKind::RunSucceeded => {
                tracing::debug!(target: TARGET, task, run = e.run, "run succeeded");
            }
            EventKind::RunFailed => {
                tracing::warn!(target: TARGET, task, run = e.run, reason, "run failed");
            }
            EventKind::RunAborted => {
                tracing::debug!(target: TARGET, task, run = e.run, reason, "run aborted");
            }
            EventKind::RetryScheduled => {
                tracing::info!(
                    target: TARGET,
                    task,
                    attempt = e.attempt,
                    delay_ms = e.delay_ms,
                    reason,
                    "retry scheduled"
                );
            }
            EventKind::RetryExhausted => {
                tracing::warn!(target: TARGET, task, attempt = e.attempt, reason, "retries exhausted");
            }
            EventKind::RetryReset => {
                tracing::debug!(target: TARGET, task, "retry counter reset");
            }
            EventKind::ScopeActivated => {
                tracing::info!(target: TARGET, scope = task, "scope activated");
            }
            EventKind::ScopeDeactivated => {
                tracing::info!(target: TARGET, scope = task, "scope deactivated");
            }
            EventKind::ScopeSetupFailed => {
                tracing::warn!(target: TARGET, scope = task, reason, "scope setup failed");
            }
            EventKind::DanglingStarted => {
                tracing::info!(target: TARGET, scope = task, instance = e.run, "dangling scope started");
            }
            EventKind::DanglingDisposed => {
                tracing::info!(target: TARGET, scope = task, instance = e.run, "dangling scope disposed");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: TARGET, subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: TARGET, subscriber = task, reason, "subscriber panicked");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: TARGET, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!(target: TARGET, "all stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::error!(target: TARGET, reason, "grace exceeded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
