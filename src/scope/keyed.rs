//! # Scope: keyed destroy-then-recreate container.
//!
//! A [`Scope`] holds at most one *instance*: the value its setup function built
//! for the current key, together with the child [`Lifetime`] that owns every
//! task, watcher and nested scope the setup created.
//!
//! ```text
//!             update(Some(k))                  update(Some(k2)), k2 != k
//! inactive ───────────────────► active(k) ─────────────────────────────► active(k2)
//!    ▲                            │        dispose(k's lifetime) first,
//!    │        update(None)        │        then setup(k2, fresh lifetime)
//!    └────────────────────────────┘
//! ```
//!
//! ## Rules
//! - An update with a key equal to the current one does nothing.
//! - The previous instance is fully torn down before setup runs again.
//! - A failing setup disposes its half-built lifetime and leaves the scope
//!   inactive; the key is not remembered, so the same key can be retried.
//! - Disposing the owner lifetime deactivates the scope for good.
//! - Dropping the last handle tears down the current instance and unregisters
//!   the scope from its owner.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;

use crate::error::ScopeError;
use crate::events::{Event, EventKind};
use crate::scope::{CleanupGuard, Lifetime};

type Setup<K, R> = dyn Fn(&K, &Lifetime) -> Result<R, ScopeError> + Send + Sync;

struct Instance<R> {
    lifetime: Lifetime,
    value: Arc<R>,
}

struct Slot<K, R> {
    key: Option<K>,
    generation: u64,
    instance: Option<Instance<R>>,
}

struct ScopeInner<K, R> {
    name: Arc<str>,
    owner: Lifetime,
    setup: Box<Setup<K, R>>,
    slot: Mutex<Slot<K, R>>,
    current: watch::Sender<Option<Arc<R>>>,
    last_error: Mutex<Option<ScopeError>>,
    _registration: Option<CleanupGuard>,
}

impl<K, R> ScopeInner<K, R> {
    fn slot(&self) -> MutexGuard<'_, Slot<K, R>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn teardown(&self, instance: Option<Instance<R>>) {
        let Some(instance) = instance else {
            return;
        };
        instance.lifetime.dispose();
        self.current.send_replace(None);
        self.owner
            .bus()
            .publish(Event::new(EventKind::ScopeDeactivated).with_task(self.name.clone()));
    }

    fn deactivate(&self) {
        let instance = {
            let mut slot = self.slot();
            slot.key = None;
            slot.generation += 1;
            slot.instance.take()
        };
        self.teardown(instance);
    }
}

impl<K, R> Drop for ScopeInner<K, R> {
    fn drop(&mut self) {
        let instance = self.slot().instance.take();
        self.teardown(instance);
    }
}

/// Reactive container that rebuilds its instance whenever the key changes.
///
/// # Example
/// ```rust
/// use taskscope::{Lifetime, Scope, ScopeError};
///
/// let owner = Lifetime::new();
/// let greeting = Scope::new(&owner, "greeting", |name: &String, _lt: &Lifetime| {
///     Ok::<_, ScopeError>(format!("hello, {name}"))
/// });
///
/// greeting.update(Some("ann".to_string())).unwrap();
/// assert_eq!(greeting.current().as_deref().map(String::as_str), Some("hello, ann"));
///
/// greeting.update(None).unwrap();
/// assert!(greeting.current().is_none());
/// ```
pub struct Scope<K, R> {
    inner: Arc<ScopeInner<K, R>>,
}

impl<K, R> Clone for Scope<K, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, R> Scope<K, R>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Creates an inactive scope owned by `owner`.
    pub fn new<F>(owner: &Lifetime, name: impl Into<Arc<str>>, setup: F) -> Self
    where
        F: Fn(&K, &Lifetime) -> Result<R, ScopeError> + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<ScopeInner<K, R>>| {
            let weak = weak.clone();
            let registration = owner.register(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.deactivate();
                }
            });
            ScopeInner {
                name: name.into(),
                owner: owner.clone(),
                setup: Box::new(setup),
                slot: Mutex::new(Slot {
                    key: None,
                    generation: 0,
                    instance: None,
                }),
                current: watch::Sender::new(None),
                last_error: Mutex::new(None),
                _registration: registration,
            }
        });
        Self { inner }
    }

    /// Creates a scope following `keys` until `owner` is disposed.
    ///
    /// The current key is applied before returning and its setup error, if
    /// any, is returned. Later failures are logged, published as
    /// [`EventKind::ScopeSetupFailed`] and kept in [`last_error`](Scope::last_error).
    pub fn watch<F>(
        owner: &Lifetime,
        name: impl Into<Arc<str>>,
        keys: watch::Receiver<Option<K>>,
        setup: F,
    ) -> Result<Self, ScopeError>
    where
        F: Fn(&K, &Lifetime) -> Result<R, ScopeError> + Send + Sync + 'static,
    {
        let scope = Self::new(owner, name, setup);
        scope.follow(keys, |key: &Option<K>| key.clone())?;
        Ok(scope)
    }

    /// Tears down the current instance if `key` differs, then sets up the new one.
    pub fn update(&self, key: Option<K>) -> Result<(), ScopeError> {
        let inner = &self.inner;
        let (previous, generation) = {
            let mut slot = inner.slot();
            if slot.key == key {
                return Ok(());
            }
            slot.key = None;
            slot.generation += 1;
            (slot.instance.take(), slot.generation)
        };
        inner.teardown(previous);

        let Some(key) = key else {
            return Ok(());
        };
        if inner.owner.is_disposed() {
            return Err(ScopeError::Disposed);
        }

        let lifetime = inner.owner.child();
        let value = match (inner.setup)(&key, &lifetime) {
            Ok(value) => Arc::new(value),
            Err(e) => {
                lifetime.dispose();
                tracing::warn!(scope = %inner.name, error = %e, "scope setup failed");
                inner.owner.bus().publish(
                    Event::new(EventKind::ScopeSetupFailed)
                        .with_task(inner.name.clone())
                        .with_reason(e.to_string()),
                );
                *inner
                    .last_error
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(e.clone());
                return Err(e);
            }
        };

        {
            let mut slot = inner.slot();
            if slot.generation != generation {
                // another update won while setup was running
                drop(slot);
                lifetime.dispose();
                return Ok(());
            }
            slot.key = Some(key);
            slot.instance = Some(Instance {
                lifetime,
                value: value.clone(),
            });
        }
        inner.current.send_replace(Some(value));
        inner
            .owner
            .bus()
            .publish(Event::new(EventKind::ScopeActivated).with_task(inner.name.clone()));
        Ok(())
    }

    /// Value built for the current key, if active.
    pub fn current(&self) -> Option<Arc<R>> {
        self.inner.current.borrow().clone()
    }

    /// Key of the current instance.
    pub fn key(&self) -> Option<K> {
        self.inner.slot().key.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.slot().instance.is_some()
    }

    /// Watch channel over the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<R>>> {
        self.inner.current.subscribe()
    }

    /// Most recent setup failure.
    pub fn last_error(&self) -> Option<ScopeError> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn follow<V, M>(&self, mut source: watch::Receiver<V>, to_key: M) -> Result<(), ScopeError>
    where
        V: Send + Sync + 'static,
        M: Fn(&V) -> Option<K> + Send + 'static,
    {
        let initial = to_key(&source.borrow_and_update());
        self.update(initial)?;

        let scope = self.clone();
        self.inner.owner.spawn(async move {
            while source.changed().await.is_ok() {
                let key = to_key(&source.borrow_and_update());
                // failures are already logged and recorded by update
                let _ = scope.update(key);
            }
        });
        Ok(())
    }
}

impl<R> Scope<(), R>
where
    R: Send + Sync + 'static,
{
    /// Creates a scope that is active while `condition` is true.
    pub fn when<F>(
        owner: &Lifetime,
        name: impl Into<Arc<str>>,
        condition: watch::Receiver<bool>,
        setup: F,
    ) -> Result<Self, ScopeError>
    where
        F: Fn(&Lifetime) -> Result<R, ScopeError> + Send + Sync + 'static,
    {
        let scope = Self::new(owner, name, move |_: &(), lifetime: &Lifetime| setup(lifetime));
        scope.follow(condition, |on: &bool| on.then_some(()))?;
        Ok(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::TaskError;
    use crate::tasks::{RunContext, Task, TaskState};

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_setup(log: Log) -> impl Fn(&char, &Lifetime) -> Result<char, ScopeError> {
        move |key, lifetime| {
            log.lock().unwrap().push(format!("setup {key}"));
            let l = log.clone();
            let key = *key;
            lifetime.on_cleanup(move || l.lock().unwrap().push(format!("teardown {key}")));
            Ok(key)
        }
    }

    #[test]
    fn equal_key_does_not_retrigger() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        let scope = Scope::new(&owner, "keyed", logging_setup(log.clone()));

        scope.update(Some('A')).unwrap();
        scope.update(Some('A')).unwrap();
        scope.update(Some('B')).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["setup A", "teardown A", "setup B"]
        );
        assert_eq!(scope.current().as_deref(), Some(&'B'));
        assert_eq!(scope.key(), Some('B'));
    }

    #[test]
    fn none_deactivates() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        let scope = Scope::new(&owner, "keyed", logging_setup(log.clone()));

        scope.update(Some('A')).unwrap();
        scope.update(None).unwrap();

        assert!(!scope.is_active());
        assert!(scope.current().is_none());
        assert_eq!(*log.lock().unwrap(), vec!["setup A", "teardown A"]);
    }

    #[test]
    fn teardown_runs_in_reverse_order() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        let l = log.clone();
        let scope = Scope::new(&owner, "ordered", move |_: &u8, lifetime: &Lifetime| {
            for n in 1..=3 {
                let l = l.clone();
                lifetime.on_cleanup(move || l.lock().unwrap().push(format!("release {n}")));
            }
            Ok(())
        });

        scope.update(Some(1)).unwrap();
        scope.update(Some(2)).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[..3], ["release 3", "release 2", "release 1"]);
    }

    #[test]
    fn failed_setup_leaves_scope_inactive() {
        let released = Arc::new(AtomicUsize::new(0));
        let owner = Lifetime::new();
        let r = released.clone();
        let scope = Scope::new(&owner, "failing", move |key: &u8, lifetime: &Lifetime| {
            let r = r.clone();
            lifetime.on_cleanup(move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
            if *key == 0 {
                return Err(ScopeError::setup("zero is not a user"));
            }
            Ok(*key)
        });

        let err = scope.update(Some(0)).unwrap_err();
        assert_eq!(err, ScopeError::setup("zero is not a user"));
        assert!(!scope.is_active());
        assert_eq!(scope.key(), None);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(scope.last_error(), Some(err));

        scope.update(Some(7)).unwrap();
        assert!(scope.is_active());
    }

    #[test]
    fn owner_disposal_tears_down_and_blocks_setup() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        let scope = Scope::new(&owner, "keyed", logging_setup(log.clone()));

        scope.update(Some('A')).unwrap();
        owner.dispose();

        assert!(!scope.is_active());
        assert_eq!(scope.update(Some('B')), Err(ScopeError::Disposed));
        assert_eq!(*log.lock().unwrap(), vec!["setup A", "teardown A"]);
    }

    #[test]
    fn dropped_scopes_do_not_pile_up_on_owner() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        for key in ['A', 'B', 'C'] {
            let scope = Scope::new(&owner, "per-request", logging_setup(log.clone()));
            scope.update(Some(key)).unwrap();
        }

        assert_eq!(format!("{owner:?}"), "Lifetime { disposed: false, cleanups: 0 }");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["setup A", "teardown A", "setup B", "teardown B", "setup C", "teardown C"]
        );
    }

    #[test]
    fn nested_scope_never_outlives_parent() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        let l = log.clone();
        let outer = Scope::new(&owner, "outer", move |_: &u8, lifetime: &Lifetime| {
            let inner = Scope::new(lifetime, "inner", logging_setup(l.clone()));
            inner.update(Some('x'))?;
            Ok(inner)
        });

        outer.update(Some(1)).unwrap();
        let inner = outer.current().unwrap();
        assert!(inner.is_active());

        outer.update(None).unwrap();
        assert!(!inner.is_active());
        assert_eq!(*log.lock().unwrap(), vec!["setup x", "teardown x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rekey_aborts_tasks_of_previous_instance() {
        let owner = Lifetime::new();
        let scope = Scope::new(&owner, "loader", |id: &u32, lifetime: &Lifetime| {
            let id = *id;
            let task = Task::new(lifetime, "load", move |_ctx: RunContext| async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, TaskError>(id)
            });
            let _ = task.run();
            Ok(task)
        });

        scope.update(Some(1)).unwrap();
        let first = scope.current().unwrap();
        scope.update(Some(2)).unwrap();

        assert_eq!(first.state(), TaskState::Aborted);
        assert!(first.is_closed());
        let second = scope.current().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(second.state(), TaskState::Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_follows_key_channel() {
        let log: Log = Arc::default();
        let owner = Lifetime::new();
        let (tx, rx) = watch::channel(Some('A'));
        let scope = Scope::watch(&owner, "watched", rx, logging_setup(log.clone())).unwrap();
        assert_eq!(scope.key(), Some('A'));

        tx.send_replace(Some('A'));
        tokio::time::sleep(Duration::from_millis(1)).await;
        tx.send_replace(Some('B'));
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["setup A", "teardown A", "setup B"]
        );

        owner.dispose();
        tx.send_replace(Some('C'));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn when_follows_condition() {
        let setups = Arc::new(AtomicUsize::new(0));
        let owner = Lifetime::new();
        let (tx, rx) = watch::channel(false);
        let s = setups.clone();
        let scope = Scope::when(&owner, "toggle", rx, move |_lt: &Lifetime| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(!scope.is_active());

        tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(scope.is_active());

        tx.send_replace(false);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!scope.is_active());
        assert_eq!(setups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_records_later_failures() {
        let owner = Lifetime::new();
        let mut events = owner.bus().subscribe();
        let (tx, rx) = watch::channel(Some(1u8));
        let scope = Scope::watch(&owner, "picky", rx, |key: &u8, _lt: &Lifetime| {
            if *key > 5 {
                Err(ScopeError::setup("too big"))
            } else {
                Ok(*key)
            }
        })
        .unwrap();

        tx.send_replace(Some(9));
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(!scope.is_active());
        assert_eq!(scope.last_error(), Some(ScopeError::setup("too big")));
        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::ScopeActivated,
                EventKind::ScopeDeactivated,
                EventKind::ScopeSetupFailed
            ]
        );
    }
}
