//! # Task state and run outcomes.
//!
//! [`TaskState`] is what observers of a task see; [`RunResult`] is what a single
//! run settles with. Both are plain tagged enums so that consumers branch on
//! the variant instead of catching errors.
//!
//! ```text
//!            run()              settle
//!  Uninit ───────► Pending ─────────────► Ok(T) | Err(E)
//!                     │
//!                     └── abort()/run()/teardown ──► Aborted
//! ```

use std::fmt;

/// Observable state of a [`Task`](crate::Task).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TaskState<T, E> {
    /// No run has been started yet.
    #[default]
    Uninit,
    /// A run is in flight.
    Pending,
    /// The latest run settled with a value.
    Ok(T),
    /// The latest run settled with an error.
    Err(E),
    /// The latest run was cancelled before it settled.
    Aborted,
}

/// Settled outcome of exactly one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunResult<T, E> {
    /// The operation returned a value.
    Ok(T),
    /// The operation returned an error, kept verbatim.
    Err(E),
    /// The run was cancelled before it settled.
    Aborted,
}

/// Payload-free tag of a [`TaskState`] or [`RunResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    Uninit,
    Pending,
    Ok,
    Err,
    Aborted,
}

impl StateKind {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Uninit => "uninit",
            StateKind::Pending => "pending",
            StateKind::Ok => "ok",
            StateKind::Err => "err",
            StateKind::Aborted => "aborted",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T, E> TaskState<T, E> {
    pub fn kind(&self) -> StateKind {
        match self {
            TaskState::Uninit => StateKind::Uninit,
            TaskState::Pending => StateKind::Pending,
            TaskState::Ok(_) => StateKind::Ok,
            TaskState::Err(_) => StateKind::Err,
            TaskState::Aborted => StateKind::Aborted,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    /// Value of the latest run, if it succeeded.
    pub fn value(&self) -> Option<&T> {
        match self {
            TaskState::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Error of the latest run, if it failed.
    pub fn error(&self) -> Option<&E> {
        match self {
            TaskState::Err(e) => Some(e),
            _ => None,
        }
    }
}

impl<T, E> RunResult<T, E> {
    pub fn kind(&self) -> StateKind {
        match self {
            RunResult::Ok(_) => StateKind::Ok,
            RunResult::Err(_) => StateKind::Err,
            RunResult::Aborted => StateKind::Aborted,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, RunResult::Ok(_))
    }

    #[inline]
    pub fn is_err(&self) -> bool {
        matches!(self, RunResult::Err(_))
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunResult::Aborted)
    }

    /// `None` for an aborted run, the operation's own result otherwise.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            RunResult::Ok(v) => Some(Ok(v)),
            RunResult::Err(e) => Some(Err(e)),
            RunResult::Aborted => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for RunResult<T, E> {
    fn from(res: Result<T, E>) -> Self {
        match res {
            Ok(v) => RunResult::Ok(v),
            Err(e) => RunResult::Err(e),
        }
    }
}

impl<T, E> From<RunResult<T, E>> for TaskState<T, E> {
    fn from(res: RunResult<T, E>) -> Self {
        match res {
            RunResult::Ok(v) => TaskState::Ok(v),
            RunResult::Err(e) => TaskState::Err(e),
            RunResult::Aborted => TaskState::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_uninit() {
        let state: TaskState<u32, String> = TaskState::default();
        assert_eq!(state.kind(), StateKind::Uninit);
    }

    #[test]
    fn run_result_maps_onto_state() {
        let ok: TaskState<u32, String> = RunResult::Ok(42).into();
        assert_eq!(ok.value(), Some(&42));

        let err: TaskState<u32, String> = RunResult::Err("boom".to_string()).into();
        assert_eq!(err.error().map(String::as_str), Some("boom"));

        let aborted: TaskState<u32, String> = RunResult::Aborted.into();
        assert_eq!(aborted.kind().as_str(), "aborted");
    }

    #[test]
    fn aborted_has_no_result() {
        assert_eq!(RunResult::<u32, String>::Aborted.into_result(), None);
        assert_eq!(RunResult::<u32, String>::Ok(1).into_result(), Some(Ok(1)));
    }
}
