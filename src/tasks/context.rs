//! # Per-run context handed to an operation.
//!
//! Every call to [`Task::run`](crate::Task::run) creates a fresh [`RunContext`].
//! The operation uses it to observe cancellation and to register abort hooks.
//!
//! ## Abort hooks
//! - run **exactly once** if the run is aborted before it settles;
//! - are **dropped unrun** if the run settles;
//! - registered after the run was aborted, run immediately.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

type AbortHook = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Running,
    Settled,
    Aborted,
}

struct Hooks {
    phase: Phase,
    pending: Vec<AbortHook>,
}

/// Shared settle/abort arbitration for one run.
pub(crate) struct RunControl {
    id: u64,
    token: CancellationToken,
    hooks: Mutex<Hooks>,
}

impl RunControl {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            token: CancellationToken::new(),
            hooks: Mutex::new(Hooks {
                phase: Phase::Running,
                pending: Vec::new(),
            }),
        })
    }

    fn hooks(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn register(&self, hook: AbortHook) {
        let mut hooks = self.hooks();
        match hooks.phase {
            Phase::Running => hooks.pending.push(hook),
            Phase::Aborted => {
                drop(hooks);
                run_hook(hook);
            }
            Phase::Settled => {}
        }
    }

    /// Marks the run settled; hooks are discarded. False if it was aborted first.
    pub(crate) fn settle(&self) -> bool {
        let mut hooks = self.hooks();
        if hooks.phase != Phase::Running {
            return false;
        }
        hooks.phase = Phase::Settled;
        hooks.pending.clear();
        true
    }

    /// Marks the run aborted, cancels its token and fires the hooks in
    /// registration order. False if it already settled or was aborted.
    pub(crate) fn abort(&self) -> bool {
        let pending = {
            let mut hooks = self.hooks();
            if hooks.phase != Phase::Running {
                return false;
            }
            hooks.phase = Phase::Aborted;
            std::mem::take(&mut hooks.pending)
        };
        self.token.cancel();
        for hook in pending {
            run_hook(hook);
        }
        true
    }
}

fn run_hook(hook: AbortHook) {
    if catch_unwind(AssertUnwindSafe(hook)).is_err() {
        tracing::error!("abort hook panicked");
    }
}

/// Handle given to an operation for the duration of one run.
///
/// # Example
/// ```rust
/// use taskscope::{Lifetime, RunContext, Task, TaskError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let lifetime = Lifetime::new();
/// let task = Task::new(&lifetime, "poll", |ctx: RunContext| async move {
///     ctx.on_abort(|| println!("request cancelled"));
///     Ok::<_, TaskError>(ctx.run_id())
/// });
/// let first = task.run().await;
/// assert_eq!(first.into_result(), Some(Ok(1)));
/// # }
/// ```
#[derive(Clone)]
pub struct RunContext {
    control: Arc<RunControl>,
}

impl RunContext {
    pub(crate) fn new(control: Arc<RunControl>) -> Self {
        Self { control }
    }

    /// Run number, 1-based and increasing per task.
    pub fn run_id(&self) -> u64 {
        self.control.id()
    }

    /// Registers cleanup that runs only if this run is aborted before settling.
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) {
        self.control.register(Box::new(hook));
    }

    /// True once the run has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.control.token().is_cancelled()
    }

    /// Completes when the run is aborted.
    pub async fn aborted(&self) {
        self.control.token().cancelled().await
    }

    /// Cancellation token of this run, for passing into cancellable APIs.
    pub fn token(&self) -> CancellationToken {
        self.control.token().clone()
    }
}
