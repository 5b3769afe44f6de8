//! # Lifetime: deterministic ownership of tasks, watchers and timers.
//!
//! A [`Lifetime`] is a stack of cleanup callbacks plus a [`CancellationToken`].
//! Everything built "inside" a lifetime (tasks, retry timers, nested scopes)
//! registers its teardown on it; [`Lifetime::dispose`] releases them in reverse
//! acquisition order. Teardown never relies on `Drop` or on the host
//! framework; dropping a task or scope early only unregisters its cleanup.
//!
//! ```text
//! root ──┬── cleanup #1 (task A: abort + close)
//!        ├── child ──┬── cleanup (task B)
//!        │           └── watcher (spawned, cancelled by token)
//!        └── cleanup #3 (scope: deactivate)
//!
//! root.dispose():  token.cancel() → #3 → child.dispose() → #1
//! ```
//!
//! ## Rules
//! - `dispose()` is idempotent; the second call is a no-op.
//! - Cleanups registered after disposal run immediately.
//! - A child never outlives its parent; a child disposed early detaches itself.
//! - A panicking cleanup is logged and does not prevent the rest from running.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::events::Bus;

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Stack {
    disposed: bool,
    next_id: u64,
    entries: Vec<(u64, Cleanup)>,
}

struct Inner {
    token: CancellationToken,
    bus: Bus,
    tracker: TaskTracker,
    parent: Option<(Weak<Inner>, u64)>,
    stack: Mutex<Stack>,
}

impl Inner {
    fn stack(&self) -> MutexGuard<'_, Stack> {
        self.stack.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn detach(&self, id: u64) {
        self.stack().entries.retain(|(entry, _)| *entry != id);
    }

    fn dispose(&self) {
        let entries = {
            let mut stack = self.stack();
            if stack.disposed {
                return;
            }
            stack.disposed = true;
            std::mem::take(&mut stack.entries)
        };

        self.token.cancel();
        for (_, cleanup) in entries.into_iter().rev() {
            if catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
                tracing::error!("lifetime cleanup panicked");
            }
        }

        if let Some((parent, id)) = &self.parent {
            if let Some(parent) = parent.upgrade() {
                parent.detach(*id);
            }
        }
    }
}

/// Cleanup registered by an object that may be dropped before its lifetime.
pub(crate) struct CleanupGuard {
    owner: Weak<Inner>,
    id: u64,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.detach(self.id);
        }
    }
}

/// Owner of teardown callbacks, released in reverse order on [`dispose`](Lifetime::dispose).
///
/// Cloning is cheap and yields a handle to the same lifetime.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<Inner>,
}

impl Lifetime {
    /// Creates a standalone root lifetime with its own event bus.
    pub fn new() -> Self {
        Self::with_bus(Bus::default())
    }

    /// Creates a root lifetime publishing events on `bus`.
    pub fn with_bus(bus: Bus) -> Self {
        Self::root(bus, TaskTracker::new())
    }

    pub(crate) fn root(bus: Bus, tracker: TaskTracker) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                bus,
                tracker,
                parent: None,
                stack: Mutex::new(Stack::default()),
            }),
        }
    }

    /// Event bus shared by this lifetime and all of its children.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Token cancelled when this lifetime (or any ancestor) is disposed.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// True once [`dispose`](Lifetime::dispose) has started.
    pub fn is_disposed(&self) -> bool {
        self.inner.stack().disposed
    }

    /// True if both handles refer to the same lifetime.
    pub fn ptr_eq(&self, other: &Lifetime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a cleanup; runs it right away if the lifetime is already disposed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        if let Err(cleanup) = self.push(Box::new(cleanup)) {
            cleanup();
        }
    }

    /// Registers a cleanup that is detached again when the guard drops.
    ///
    /// Returns `None` without running `cleanup` if the lifetime is disposed.
    pub(crate) fn register(
        &self,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> Option<CleanupGuard> {
        let id = self.push(Box::new(cleanup)).ok()?;
        Some(CleanupGuard {
            owner: Arc::downgrade(&self.inner),
            id,
        })
    }

    fn push(&self, cleanup: Cleanup) -> Result<u64, Cleanup> {
        let mut stack = self.inner.stack();
        if stack.disposed {
            return Err(cleanup);
        }
        let id = stack.next_id;
        stack.next_id += 1;
        stack.entries.push((id, cleanup));
        Ok(id)
    }

    /// Creates a nested lifetime that is disposed together with this one.
    ///
    /// The child of a disposed lifetime starts out disposed.
    pub fn child(&self) -> Lifetime {
        let mut stack = self.inner.stack();
        let id = stack.next_id;
        stack.next_id += 1;

        let child = Lifetime {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                bus: self.inner.bus.clone(),
                tracker: self.inner.tracker.clone(),
                parent: Some((Arc::downgrade(&self.inner), id)),
                stack: Mutex::new(Stack {
                    disposed: stack.disposed,
                    ..Stack::default()
                }),
            }),
        };

        if !stack.disposed {
            let weak = Arc::downgrade(&child.inner);
            stack.entries.push((
                id,
                Box::new(move || {
                    if let Some(child) = weak.upgrade() {
                        child.dispose();
                    }
                }),
            ));
        }
        child
    }

    /// Cancels the token, then runs every cleanup in reverse registration order.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Spawns `fut` on tokio; it is dropped at its next suspension point once
    /// this lifetime is disposed.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.inner.stack();
        f.debug_struct("Lifetime")
            .field("disposed", &stack.disposed)
            .field("cleanups", &stack.entries.len())
            .finish()
    }
}
