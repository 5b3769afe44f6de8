//! # Runtime events emitted by tasks, utilities and scopes.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Run events**: one task run's lifecycle (starting, succeeded, failed, aborted)
//! - **Retry events**: scheduling and exhaustion of automatic retries
//! - **Scope events**: keyed and dangling scopes being set up and torn down
//! - **Runtime events**: subscriber health and shutdown progress
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task name,
//! run number, reasons and retry delays.
//!
//! ## Ordering guarantees
//! Each event is stamped by the [`Bus`](super::Bus) it is published on with a
//! sequence number (`seq`) that increases monotonically per bus.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskscope::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_task("load-user")
//!     .with_reason("connection refused")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(100));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.task.as_deref(), Some("load-user"));
//! assert_eq!(ev.delay_ms, Some(100));
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Runtime shutdown requested.
    ShutdownRequested,

    /// All spawned watchers stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some watchers did not stop in time.
    GraceExceeded,

    // === Run lifecycle events ===
    /// A task run started.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `task_id`: task id
    /// - `run`: run number (1-based, per task)
    RunStarting,

    /// A task run settled with a value.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `task_id`: task id
    /// - `run`: run number
    RunSucceeded,

    /// A task run settled with an error.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `task_id`: task id
    /// - `run`: run number
    /// - `reason`: debug rendering of the error
    RunFailed,

    /// A task run was aborted before it settled.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `task_id`: task id
    /// - `run`: run number
    /// - `reason`: what aborted it (`"superseded"`, `"abort"`, `"teardown"`, `"dropped"`, `"panic"`)
    RunAborted,

    // === Retry events ===
    /// A retry was scheduled after a failed run.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `attempt`: retry number (1-based since last reset)
    /// - `delay_ms`: delay before the retry
    /// - `reason`: last failure
    RetryScheduled,

    /// The retry budget is spent; no further retries until a reset.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `attempt`: retries performed
    /// - `reason`: last failure
    RetryExhausted,

    /// The retry counter went back to zero (success or manual reset).
    ///
    /// Sets:
    /// - `task`: task name
    RetryReset,

    // === Scope events ===
    /// A keyed scope ran its setup for a new key.
    ///
    /// Sets:
    /// - `task`: scope name
    ScopeActivated,

    /// A keyed scope tore down its current setup.
    ///
    /// Sets:
    /// - `task`: scope name
    ScopeDeactivated,

    /// A keyed scope setup failed; the scope stays inactive.
    ///
    /// Sets:
    /// - `task`: scope name
    /// - `reason`: setup error
    ScopeSetupFailed,

    /// A dangling scope started a new detached instance.
    ///
    /// Sets:
    /// - `task`: scope name
    DanglingStarted,

    /// A dangling scope instance was disposed.
    ///
    /// Sets:
    /// - `task`: scope name
    DanglingDisposed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: per-bus monotonic sequence for ordering (assigned on publish)
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Sequence number assigned by the bus on publish.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Retry attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Run number of the task the event refers to.
    pub run: Option<u64>,
    /// Bus-unique id of the task, telling apart tasks that share a name.
    pub task_id: Option<u64>,
    /// Name of the task or scope, if applicable.
    pub task: Option<Arc<str>>,
    /// Event classification.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            kind,
            at: SystemTime::now(),
            attempt: None,
            run: None,
            task_id: None,
            reason: None,
            delay_ms: None,
            task: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task or scope name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a retry attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a run number.
    #[inline]
    pub fn with_run(mut self, run: u64) -> Self {
        self.run = Some(run);
        self
    }

    /// Attaches the id of the emitting task.
    #[inline]
    pub fn with_task_id(mut self, id: u64) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }

    /// True for events that end a run (succeeded, failed or aborted).
    #[inline]
    pub fn is_run_settled(&self) -> bool {
        matches!(
            self.kind,
            EventKind::RunSucceeded | EventKind::RunFailed | EventKind::RunAborted
        )
    }
}
