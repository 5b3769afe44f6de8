//! # Remembered results: last settlement and stale-if-error.
//!
//! [`LastResult`] keeps the latest `Ok`/`Err` settlement of a task and ignores
//! everything else. [`StaleState`] splits it further: the last value and the
//! last error are kept in **independent** slots, so a failed refresh shows the
//! error next to the data it failed to replace.
//!
//! ```text
//! settlements:  Ok(1)        Err(e1)            Ok(2)
//! data:         Some(1)      Some(1)            Some(2)
//! error:        None         Some(e1)           Some(e1)
//! fresh:        true         false              true
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::scope::Lifetime;
use crate::tasks::{RunResult, TaskHandle, TaskState};

/// Latest `Ok`/`Err` settlement of a task; aborted runs do not clear it.
pub struct LastResult<T, E> {
    value: Arc<watch::Sender<Option<RunResult<T, E>>>>,
}

impl<T, E> Clone for LastResult<T, E> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T, E> LastResult<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Remembers `task`'s settlements until `lifetime` is disposed.
    pub fn new<H>(lifetime: &Lifetime, task: &H) -> Self
    where
        H: TaskHandle<Value = T, Error = E>,
    {
        let initial = match task.state() {
            TaskState::Ok(v) => Some(RunResult::Ok(v)),
            TaskState::Err(e) => Some(RunResult::Err(e)),
            _ => None,
        };
        let value = Arc::new(watch::Sender::new(initial));
        let out = value.clone();
        let mut settled = task.settlements();

        lifetime.spawn(async move {
            loop {
                match settled.recv().await {
                    Ok(RunResult::Aborted) => {}
                    Ok(result) => {
                        out.send_replace(Some(result));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { value }
    }

    pub fn get(&self) -> Option<RunResult<T, E>> {
        self.value.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RunResult<T, E>>> {
        self.value.subscribe()
    }
}

/// Snapshot of the stale-if-error projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleSnapshot<T, E> {
    /// Last successful value, kept through later failures.
    pub data: Option<T>,
    /// Last error, kept through later successes.
    pub error: Option<E>,
    /// A run is in flight.
    pub pending: bool,
    /// `data` comes from the latest completed run.
    pub fresh: bool,
}

impl<T, E> Default for StaleSnapshot<T, E> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            pending: false,
            fresh: false,
        }
    }
}

impl<T, E> StaleSnapshot<T, E> {
    fn apply(&mut self, result: RunResult<T, E>) {
        match result {
            RunResult::Ok(v) => {
                self.data = Some(v);
                self.fresh = true;
            }
            RunResult::Err(e) => {
                self.error = Some(e);
                self.fresh = false;
            }
            RunResult::Aborted => {}
        }
    }
}

/// Stale-if-error view over a task.
pub struct StaleState<T, E> {
    value: Arc<watch::Sender<StaleSnapshot<T, E>>>,
}

impl<T, E> Clone for StaleState<T, E> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T, E> StaleState<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Projects `task` until `lifetime` is disposed.
    pub fn new<H>(lifetime: &Lifetime, task: &H) -> Self
    where
        H: TaskHandle<Value = T, Error = E>,
    {
        let mut initial = StaleSnapshot::default();
        match task.state() {
            TaskState::Ok(v) => initial.apply(RunResult::Ok(v)),
            TaskState::Err(e) => initial.apply(RunResult::Err(e)),
            TaskState::Pending => initial.pending = true,
            TaskState::Uninit | TaskState::Aborted => {}
        }
        let value = Arc::new(watch::Sender::new(initial));
        let out = value.clone();
        let mut settled = task.settlements();
        let mut states = task.subscribe();

        lifetime.spawn(async move {
            loop {
                let result = tokio::select! {
                    res = settled.recv() => match res {
                        Ok(result) => Some(result),
                        Err(broadcast::error::RecvError::Lagged(_)) => None,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        None
                    }
                };
                let pending = states.borrow_and_update().is_pending();
                out.send_if_modified(|snap| {
                    let before = (snap.pending, snap.fresh);
                    let touched = result.as_ref().is_some_and(|r| !r.is_aborted());
                    if let Some(result) = result {
                        snap.apply(result);
                    }
                    snap.pending = pending;
                    touched || before != (snap.pending, snap.fresh)
                });
            }
        });
        Self { value }
    }

    pub fn get(&self) -> StaleSnapshot<T, E> {
        self.value.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StaleSnapshot<T, E>> {
        self.value.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::error::TaskError;
    use crate::tasks::{RunContext, Task};

    /// Each run pops the next scripted outcome.
    fn scripted(lifetime: &Lifetime, script: Vec<Result<u32, &'static str>>) -> Task<u32> {
        let script = Arc::new(Mutex::new(script.into_iter()));
        Task::new(lifetime, "scripted", move |_ctx: RunContext| {
            let next = script.lock().unwrap().next();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                match next {
                    Some(Ok(v)) => Ok(v),
                    Some(Err(e)) => Err(TaskError::fail(e)),
                    None => Err(TaskError::fail("script exhausted")),
                }
            }
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn error_after_success_keeps_data() {
        let lt = Lifetime::new();
        let task = scripted(&lt, vec![Ok(1), Err("boom")]);
        let stale = StaleState::new(&lt, &task);

        task.run().await;
        settle().await;
        assert_eq!(stale.get().data, Some(1));
        assert!(stale.get().fresh);

        task.run().await;
        settle().await;
        let snap = stale.get();
        assert_eq!(snap.data, Some(1));
        assert_eq!(snap.error, Some(TaskError::fail("boom")));
        assert!(!snap.fresh);
        assert!(!snap.pending);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_error_keeps_error() {
        let lt = Lifetime::new();
        let task = scripted(&lt, vec![Err("boom"), Ok(2)]);
        let stale = StaleState::new(&lt, &task);

        task.run().await;
        task.run().await;
        settle().await;

        let snap = stale.get();
        assert_eq!(snap.data, Some(2));
        assert_eq!(snap.error, Some(TaskError::fail("boom")));
        assert!(snap.fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_is_tracked_without_touching_slots() {
        let lt = Lifetime::new();
        let task = scripted(&lt, vec![Ok(1), Ok(2)]);
        let stale = StaleState::new(&lt, &task);

        task.run().await;
        let _ = task.run();
        settle().await;

        let snap = stale.get();
        assert!(snap.pending);
        assert_eq!(snap.data, Some(1));
        assert!(snap.fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_rerun_does_not_lose_settlement() {
        let lt = Lifetime::new();
        let task = scripted(&lt, vec![Ok(7), Ok(8)]);
        let stale = StaleState::new(&lt, &task);

        task.run().await;
        // rerun before the projection had a chance to observe Ok(7)
        let _ = task.run();
        settle().await;
        assert_eq!(stale.get().data, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn last_result_ignores_aborts() {
        let lt = Lifetime::new();
        let task = scripted(&lt, vec![Ok(1), Ok(2)]);
        let last = LastResult::new(&lt, &task);
        assert_eq!(last.get(), None);

        task.run().await;
        let _ = task.run();
        task.abort();
        settle().await;

        assert_eq!(last.get(), Some(RunResult::Ok(1)));
    }
}
