//! # Which tasks have a run in flight, ordered by event sequence.
//!
//! ```text
//! Bus ──► subscriber_listener() ──► InFlightTracker::update()
//!                                          │
//!                                          ▼
//!                       HashMap<(task name, task id), Entry>
//!                                  (key → {seq, run})
//! ```
//!
//! ## Rules
//! - `RunStarting` marks the task in flight with its run number.
//! - `RunSucceeded` / `RunFailed` / `RunAborted` clear it, but only for the
//!   run that is recorded; a late settlement of a superseded run is ignored.
//! - Tasks sharing a name are told apart by the task id carried in events.
//! - Events with `seq <= last_seq` for the same task are rejected (stale).
//! - Reads are eventually consistent with the bus.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

type Key = (String, Option<u64>);

#[derive(Debug, Clone, Default)]
struct Entry {
    last_seq: u64,
    run: Option<u64>,
}

/// Tracker of tasks with a run in flight, keyed by task name and id.
#[derive(Default)]
pub struct InFlightTracker {
    state: RwLock<HashMap<Key, Entry>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `ev`; returns true if the in-flight set changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(name) = ev.task.as_deref() else {
            return false;
        };
        let starting = ev.kind == EventKind::RunStarting;
        if !starting && !ev.is_run_settled() {
            return false;
        }

        let mut state = self.state.write().await;
        let key = (name.to_string(), ev.task_id);
        let entry = state.entry(key.clone()).or_default();
        if ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;

        if starting {
            entry.run = ev.run;
            return true;
        }
        if entry.run.is_some() && entry.run == ev.run {
            state.remove(&key);
            return true;
        }
        false
    }

    /// Sorted names of tasks with a run in flight; a name appears once per task.
    pub async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .iter()
            .filter(|(_, e)| e.run.is_some())
            .map(|((name, _), _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// True if any task called `name` has a run in flight.
    pub async fn is_in_flight(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .iter()
            .any(|((n, _), e)| n == name && e.run.is_some())
    }
}
