//! # DanglingScope: imperatively started, self-disposing units of work.
//!
//! Unlike [`Scope`](crate::Scope) there is no key. Each [`setup`](DanglingScope::setup)
//! call replaces the previous instance; the factory gets a [`Dispose`] handle
//! so the instance can end itself (after a timeout, on success, ...).

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::ScopeError;
use crate::events::{Event, EventKind};
use crate::scope::Lifetime;

struct Instance<R> {
    id: u64,
    lifetime: Lifetime,
    value: Arc<R>,
}

struct Slot<R> {
    next_id: u64,
    active: Option<Instance<R>>,
}

struct DanglingInner<R> {
    name: Arc<str>,
    owner: Lifetime,
    slot: Mutex<Slot<R>>,
}

impl<R> DanglingInner<R> {
    fn slot(&self) -> MutexGuard<'_, Slot<R>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Forgets instance `id` if it is still the active one.
    fn release(&self, id: u64) {
        let mut slot = self.slot();
        if slot.active.as_ref().is_some_and(|a| a.id == id) {
            slot.active = None;
        }
    }
}

/// Handle that disposes exactly one [`DanglingScope`] instance.
///
/// Calling it after that instance was replaced does not touch the newer one.
#[derive(Clone, Debug)]
pub struct Dispose {
    lifetime: Lifetime,
}

impl Dispose {
    pub fn dispose(&self) {
        self.lifetime.dispose();
    }

    /// True once the instance has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.lifetime.is_disposed()
    }
}

/// Unkeyed scope for one-off detached work.
///
/// # Example
/// ```rust
/// use taskscope::{DanglingScope, Lifetime};
///
/// let owner = Lifetime::new();
/// let submit = DanglingScope::new(&owner, "submit");
///
/// let value = submit.setup(|_lt, dispose| {
///     dispose.dispose();
///     "sent"
/// }).unwrap();
///
/// assert_eq!(*value, "sent");
/// assert!(!submit.is_active());
/// ```
pub struct DanglingScope<R> {
    inner: Arc<DanglingInner<R>>,
}

impl<R> Clone for DanglingScope<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> DanglingScope<R>
where
    R: Send + Sync + 'static,
{
    /// Creates an idle scope; instances never outlive `owner`.
    pub fn new(owner: &Lifetime, name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(DanglingInner {
                name: name.into(),
                owner: owner.clone(),
                slot: Mutex::new(Slot {
                    next_id: 0,
                    active: None,
                }),
            }),
        }
    }

    /// Tears down the current instance, then builds a new one with `factory`.
    pub fn setup<F>(&self, factory: F) -> Result<Arc<R>, ScopeError>
    where
        F: FnOnce(&Lifetime, Dispose) -> R,
    {
        let inner = &self.inner;
        if inner.owner.is_disposed() {
            return Err(ScopeError::Disposed);
        }
        self.dispose();

        let lifetime = inner.owner.child();
        let id = {
            let mut slot = inner.slot();
            slot.next_id += 1;
            slot.next_id
        };

        let weak: Weak<DanglingInner<R>> = Arc::downgrade(inner);
        lifetime.on_cleanup(move || {
            if let Some(inner) = weak.upgrade() {
                inner.release(id);
                inner.owner.bus().publish(
                    Event::new(EventKind::DanglingDisposed)
                        .with_task(inner.name.clone())
                        .with_run(id),
                );
            }
        });

        inner.owner.bus().publish(
            Event::new(EventKind::DanglingStarted)
                .with_task(inner.name.clone())
                .with_run(id),
        );
        let value = Arc::new(factory(
            &lifetime,
            Dispose {
                lifetime: lifetime.clone(),
            },
        ));

        if !lifetime.is_disposed() {
            inner.slot().active = Some(Instance {
                id,
                lifetime,
                value: value.clone(),
            });
        }
        Ok(value)
    }

    /// Tears down the current instance; no-op when idle.
    pub fn dispose(&self) {
        let active = self.inner.slot().active.take();
        if let Some(active) = active {
            active.lifetime.dispose();
        }
    }

    /// Value built by the active instance.
    pub fn current(&self) -> Option<Arc<R>> {
        self.inner.slot().active.as_ref().map(|a| a.value.clone())
    }

    pub fn is_active(&self) -> bool {
        self.inner.slot().active.is_some()
    }
}
