//! # Task: one cancellable, repeatable async operation and its state.
//!
//! A [`Task`] binds an [`Operation`] to a [`Lifetime`]. Each [`run`](Task::run)
//! spawns a fresh execution; at most one run is in flight at any time.
//!
//! ## Run flow
//! ```text
//! run()
//!   ├─► take in-flight run (if any) ──► abort: hooks, state=Aborted, reply Aborted
//!   ├─► runs += 1, state=Pending, publish RunStarting
//!   └─► spawn:
//!         select! {
//!           token cancelled  ─► nothing (abort path already settled the run)
//!           op.call(ctx)     ─► settle: state=Ok/Err, broadcast, reply, publish
//!           op panicked      ─► settle as Aborted (logged)
//!         }
//! ```
//!
//! ## Rules
//! - The aborted run's [`RunFuture`] resolves **before** the next run starts.
//! - `Pending` is visible as soon as `run()` returns.
//! - Errors are values: `run()` never fails, it resolves to a [`RunResult`].
//! - Disposing the lifetime aborts the in-flight run and closes the task;
//!   further `run()` calls resolve `Aborted` without touching state.
//! - Dropping the last handle aborts the in-flight run the same way and
//!   unregisters the task from its lifetime.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::FutureExt;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::task::TaskTracker;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::scope::{CleanupGuard, Lifetime};
use crate::tasks::context::{RunContext, RunControl};
use crate::tasks::handle::{RunFuture, TaskHandle};
use crate::tasks::operation::{Operation, OperationRef};
use crate::tasks::state::{RunResult, TaskState};

/// Settlements a slow observer may fall behind before it starts lagging.
const SETTLEMENT_CAPACITY: usize = 64;

struct InFlight<T, E> {
    control: Arc<RunControl>,
    reply: oneshot::Sender<RunResult<T, E>>,
}

struct Slot<T, E> {
    runs: u64,
    closed: bool,
    in_flight: Option<InFlight<T, E>>,
}

struct TaskInner<T, E> {
    name: Arc<str>,
    id: u64,
    op: OperationRef<T, E>,
    bus: Bus,
    tracker: TaskTracker,
    state: watch::Sender<TaskState<T, E>>,
    settled: broadcast::Sender<RunResult<T, E>>,
    slot: Mutex<Slot<T, E>>,
    _registration: Option<CleanupGuard>,
}

impl<T, E> TaskInner<T, E> {
    fn slot(&self) -> MutexGuard<'_, Slot<T, E>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Aborts the run unconditionally; it must already be taken out of the slot.
    fn abort_run(&self, in_flight: InFlight<T, E>, reason: &'static str) {
        if !in_flight.control.abort() {
            return;
        }
        self.bus.publish(
            Event::new(EventKind::RunAborted)
                .with_task(self.name.clone())
                .with_task_id(self.id)
                .with_run(in_flight.control.id())
                .with_reason(reason),
        );
        self.state.send_replace(TaskState::Aborted);
        let _ = self.settled.send(RunResult::Aborted);
        let _ = in_flight.reply.send(RunResult::Aborted);
    }

    /// Aborts the run if it is still the one in flight.
    fn abort_if_current(&self, control: &Arc<RunControl>, reason: &'static str) {
        let in_flight = {
            let mut slot = self.slot();
            match &slot.in_flight {
                Some(cur) if Arc::ptr_eq(&cur.control, control) => slot.in_flight.take(),
                _ => None,
            }
        };
        if let Some(in_flight) = in_flight {
            self.abort_run(in_flight, reason);
        }
    }

    fn close(&self, reason: &'static str) {
        let in_flight = {
            let mut slot = self.slot();
            slot.closed = true;
            slot.in_flight.take()
        };
        if let Some(in_flight) = in_flight {
            self.abort_run(in_flight, reason);
        }
    }
}

impl<T, E> Drop for TaskInner<T, E> {
    /// The last handle went away: the run in flight is aborted like on teardown.
    fn drop(&mut self) {
        self.close("dropped");
    }
}

impl<T, E> TaskInner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Settles the run if it is still the one in flight.
    fn settle(&self, control: &Arc<RunControl>, res: Result<T, E>) {
        let in_flight = {
            let mut slot = self.slot();
            match &slot.in_flight {
                Some(cur) if Arc::ptr_eq(&cur.control, control) => slot.in_flight.take(),
                _ => None,
            }
        };
        let Some(in_flight) = in_flight else {
            return;
        };
        if !in_flight.control.settle() {
            return;
        }

        let result = RunResult::from(res);
        match &result {
            RunResult::Err(e) => self.bus.publish(
                Event::new(EventKind::RunFailed)
                    .with_task(self.name.clone())
                    .with_task_id(self.id)
                    .with_run(control.id())
                    .with_reason(format!("{e:?}")),
            ),
            _ => self.bus.publish(
                Event::new(EventKind::RunSucceeded)
                    .with_task(self.name.clone())
                    .with_task_id(self.id)
                    .with_run(control.id()),
            ),
        }
        self.finish(in_flight.reply, result);
    }

    fn finish(&self, reply: oneshot::Sender<RunResult<T, E>>, result: RunResult<T, E>) {
        self.state.send_replace(result.clone().into());
        let _ = self.settled.send(result.clone());
        let _ = reply.send(result);
    }
}

/// # Cancellable, repeatable async operation with observable state.
///
/// Cloning yields another handle to the same task.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use taskscope::{Lifetime, RunContext, RunResult, Task, TaskError, TaskState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let lifetime = Lifetime::new();
/// let answer = Task::new(&lifetime, "answer", |_ctx: RunContext| async {
///     tokio::time::sleep(Duration::from_millis(5)).await;
///     Ok::<_, TaskError>(42)
/// });
///
/// assert_eq!(answer.state(), TaskState::Uninit);
/// let run = answer.run();
/// assert_eq!(answer.state(), TaskState::Pending);
/// assert_eq!(run.await, RunResult::Ok(42));
/// assert_eq!(answer.state(), TaskState::Ok(42));
/// # }
/// ```
pub struct Task<T, E = TaskError> {
    inner: Arc<TaskInner<T, E>>,
}

impl<T, E> Clone for Task<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Binds `op` to `lifetime`; disposing the lifetime aborts and closes the task.
    pub fn new(lifetime: &Lifetime, name: impl Into<Arc<str>>, op: impl Operation<T, E>) -> Self {
        Self::from_operation(lifetime, name, Arc::new(op))
    }

    /// Same as [`Task::new`] for an already shared operation.
    pub fn from_operation(
        lifetime: &Lifetime,
        name: impl Into<Arc<str>>,
        op: OperationRef<T, E>,
    ) -> Self {
        let (settled, _) = broadcast::channel(SETTLEMENT_CAPACITY);
        let inner = Arc::new_cyclic(|weak: &Weak<TaskInner<T, E>>| {
            let weak = weak.clone();
            let registration = lifetime.register(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.close("teardown");
                }
            });
            TaskInner {
                name: name.into(),
                id: lifetime.bus().next_source_id(),
                op,
                bus: lifetime.bus().clone(),
                tracker: lifetime.tracker().clone(),
                state: watch::Sender::new(TaskState::Uninit),
                settled,
                slot: Mutex::new(Slot {
                    runs: 0,
                    closed: registration.is_none(),
                    in_flight: None,
                }),
                _registration: registration,
            }
        });
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Starts a new run, aborting the one in flight first.
    pub fn run(&self) -> RunFuture<T, E> {
        let (reply, rx) = oneshot::channel();
        let (control, superseded) = {
            let mut slot = self.inner.slot();
            if slot.closed {
                tracing::debug!(task = %self.inner.name, "run on closed task ignored");
                return RunFuture::aborted();
            }
            let superseded = slot.in_flight.take();
            slot.runs += 1;
            let control = RunControl::new(slot.runs);
            slot.in_flight = Some(InFlight {
                control: control.clone(),
                reply,
            });
            (control, superseded)
        };

        if let Some(prev) = superseded {
            self.inner.abort_run(prev, "superseded");
        }

        self.inner.state.send_replace(TaskState::Pending);
        self.inner.bus.publish(
            Event::new(EventKind::RunStarting)
                .with_task(self.inner.name.clone())
                .with_task_id(self.inner.id)
                .with_run(control.id()),
        );

        let op = Arc::clone(&self.inner.op);
        let weak = Arc::downgrade(&self.inner);
        self.inner.tracker.spawn(async move {
            let token = control.token().clone();
            let call = AssertUnwindSafe(op.call(RunContext::new(control.clone()))).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                res = call => Some(res),
            };

            let Some(inner) = weak.upgrade() else {
                return;
            };
            match outcome {
                None => {}
                Some(Ok(res)) => inner.settle(&control, res),
                Some(Err(_panic)) => {
                    tracing::error!(task = %inner.name, run = control.id(), "operation panicked");
                    inner.abort_if_current(&control, "panic");
                }
            }
        });

        RunFuture::new(rx)
    }

    /// Aborts the run in flight; no-op when idle.
    pub fn abort(&self) {
        let in_flight = self.inner.slot().in_flight.take();
        if let Some(in_flight) = in_flight {
            self.inner.abort_run(in_flight, "abort");
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> TaskState<T, E> {
        self.inner.state.borrow().clone()
    }

    /// Watch channel over the state.
    pub fn subscribe(&self) -> watch::Receiver<TaskState<T, E>> {
        self.inner.state.subscribe()
    }

    /// Broadcast of every settlement (including aborts) from now on.
    pub fn settlements(&self) -> broadcast::Receiver<RunResult<T, E>> {
        self.inner.settled.subscribe()
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> u64 {
        self.inner.slot().runs
    }

    /// True once the owning lifetime has been disposed.
    pub fn is_closed(&self) -> bool {
        self.inner.slot().closed
    }
}

impl<T, E> TaskHandle for Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Value = T;
    type Error = E;

    fn name(&self) -> &str {
        Task::name(self)
    }

    fn run(&self) -> RunFuture<T, E> {
        Task::run(self)
    }

    fn abort(&self) {
        Task::abort(self)
    }

    fn state(&self) -> TaskState<T, E> {
        Task::state(self)
    }

    fn subscribe(&self) -> watch::Receiver<TaskState<T, E>> {
        Task::subscribe(self)
    }

    fn settlements(&self) -> broadcast::Receiver<RunResult<T, E>> {
        Task::settlements(self)
    }
}

impl<T, E> fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.inner.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::tasks::state::StateKind;

    fn answer(lifetime: &Lifetime) -> Task<u32> {
        Task::new(lifetime, "answer", |_ctx: RunContext| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(42)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_uninit_then_pending_then_ok() {
        let lt = Lifetime::new();
        let task = answer(&lt);

        assert_eq!(task.state().kind(), StateKind::Uninit);
        let run = task.run();
        assert_eq!(task.state().kind(), StateKind::Pending);
        assert_eq!(run.await, RunResult::Ok(42));
        assert_eq!(task.state(), TaskState::Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn error_is_captured_verbatim() {
        let lt = Lifetime::new();
        let task: Task<u32> = Task::new(&lt, "boom", |_ctx: RunContext| async {
            Err(TaskError::fail("boom"))
        });

        let res = task.run().await;
        assert_eq!(res, RunResult::Err(TaskError::fail("boom")));
        assert_eq!(task.state(), TaskState::Err(TaskError::fail("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn non_error_failure_values_are_kept() {
        let lt = Lifetime::new();
        let task: Task<(), &'static str> =
            Task::new(&lt, "raw", |_ctx: RunContext| async { Err("not an error type") });
        assert_eq!(task.run().await, RunResult::Err("not an error type"));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_right_after_run_yields_aborted() {
        let lt = Lifetime::new();
        let task = answer(&lt);

        let run = task.run();
        task.abort();
        assert_eq!(run.await, RunResult::Aborted);
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_when_idle_is_a_no_op() {
        let lt = Lifetime::new();
        let task = answer(&lt);
        task.abort();
        assert_eq!(task.state(), TaskState::Uninit);

        assert_eq!(task.run().await, RunResult::Ok(42));
        task.abort();
        assert_eq!(task.state(), TaskState::Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_aborts_first_before_it_resolves() {
        let lt = Lifetime::new();
        let task = answer(&lt);

        let mut first = task.run();
        let second = task.run();

        // already settled before the second run had any chance to progress
        assert_eq!(
            futures::FutureExt::now_or_never(&mut first),
            Some(RunResult::Aborted)
        );
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(second.await, RunResult::Ok(42));
        assert_eq!(task.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_hook_runs_only_when_aborted() {
        let lt = Lifetime::new();
        let hooks = Arc::new(AtomicUsize::new(0));
        let h = hooks.clone();
        let task: Task<u64> = Task::new(&lt, "hooked", move |ctx: RunContext| {
            let h = h.clone();
            async move {
                ctx.on_abort(move || {
                    h.fetch_add(1, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(ctx.run_id())
            }
        });

        assert_eq!(task.run().await, RunResult::Ok(1));
        assert_eq!(hooks.load(Ordering::SeqCst), 0);

        let run = task.run();
        // let the operation register its hook
        tokio::time::sleep(Duration::from_millis(1)).await;
        task.abort();
        assert_eq!(run.await, RunResult::Aborted);
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_aborts_run() {
        let lt = Lifetime::new();
        let mut events = lt.bus().subscribe();
        let hooks = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (h, f) = (hooks.clone(), finished.clone());
        let task: Task<()> = Task::new(&lt, "orphan", move |ctx: RunContext| {
            let (h, f) = (h.clone(), f.clone());
            async move {
                ctx.on_abort(move || {
                    h.fetch_add(1, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_secs(1)).await;
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let run = task.run();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(task);

        assert_eq!(run.await, RunResult::Aborted);
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        assert_eq!(events.recv().await.unwrap().kind, EventKind::RunStarting);
        let aborted = events.recv().await.unwrap();
        assert_eq!(aborted.kind, EventKind::RunAborted);
        assert_eq!(aborted.reason.as_deref(), Some("dropped"));
        assert_eq!(format!("{lt:?}"), "Lifetime { disposed: false, cleanups: 0 }");
    }

    #[tokio::test(start_paused = true)]
    async fn task_on_disposed_lifetime_starts_closed() {
        let lt = Lifetime::new();
        lt.dispose();
        let task = answer(&lt);
        assert!(task.is_closed());
        assert_eq!(task.run().await, RunResult::Aborted);
        assert_eq!(task.state(), TaskState::Uninit);
    }

    #[tokio::test(start_paused = true)]
    async fn same_name_tasks_get_distinct_ids() {
        let lt = Lifetime::new();
        let mut events = lt.bus().subscribe();
        let a = answer(&lt);
        let b = answer(&lt);

        let _ = a.run();
        let _ = b.run();
        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.task, second.task);
        assert_ne!(first.task_id, second.task_id);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_result_is_discarded() {
        let lt = Lifetime::new();
        let task = answer(&lt);
        let mut settled = task.settlements();

        let _ = task.run();
        task.abort();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(settled.recv().await.unwrap(), RunResult::Aborted);
        assert!(settled.try_recv().is_err());
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_aborts_and_closes() {
        let lt = Lifetime::new();
        let task = answer(&lt);

        let run = task.run();
        lt.dispose();
        assert_eq!(run.await, RunResult::Aborted);
        assert!(task.is_closed());

        assert_eq!(task.run().await, RunResult::Aborted);
        assert_eq!(task.state(), TaskState::Aborted);
        assert_eq!(task.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_operation_settles_as_aborted() {
        let lt = Lifetime::new();
        let task: Task<u32> = Task::new(&lt, "panics", |_ctx: RunContext| async {
            if true {
                panic!("operation exploded");
            }
            Ok(1)
        });

        assert_eq!(task.run().await, RunResult::Aborted);
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn run_events_are_published() {
        let lt = Lifetime::new();
        let mut events = lt.bus().subscribe();
        let task = answer(&lt);

        task.run().await;
        let starting = events.recv().await.unwrap();
        let done = events.recv().await.unwrap();
        assert_eq!(starting.kind, EventKind::RunStarting);
        assert_eq!(starting.run, Some(1));
        assert_eq!(done.kind, EventKind::RunSucceeded);
        assert_eq!(done.task.as_deref(), Some("answer"));
    }
}
