//! Error types used by the taskscope runtime, scopes and operations.
//!
//! This module defines three error enums:
//!
//! - [`RuntimeError`] — errors raised by the runtime itself (shutdown).
//! - [`ScopeError`] — errors raised while setting up a scope instance.
//! - [`TaskError`] — a ready-made failure type for operations.
//!
//! Operation failures are *values*: a task run never returns them through
//! `Err`, it settles as [`RunResult::Err`](crate::RunResult::Err) holding
//! whatever error type the operation chose. [`TaskError`] is only a
//! convenience for operations that have no error type of their own.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the taskscope runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some watchers were still running.
    #[error("shutdown timeout {grace:?} exceeded; {still_running} still running")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Runs and watchers that had not stopped when the grace ran out.
        still_running: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskscope::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), still_running: 1 };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded {
                grace,
                still_running,
            } => {
                format!("grace exceeded after {grace:?}; still running={still_running}")
            }
        }
    }
}

/// # Errors produced while activating a scope.
///
/// A failing setup never leaves a scope half-active: the instance lifetime is
/// disposed and the scope stays inactive.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The setup function refused to build an instance.
    #[error("scope setup failed: {error}")]
    Setup {
        /// The underlying error message.
        error: String,
    },

    /// The owning lifetime is already disposed; nothing can be set up.
    #[error("scope owner is disposed")]
    Disposed,
}

impl ScopeError {
    /// Builds a [`ScopeError::Setup`] from anything printable.
    pub fn setup(error: impl fmt::Display) -> Self {
        ScopeError::Setup {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskscope::ScopeError;
    ///
    /// assert_eq!(ScopeError::setup("no user").as_label(), "scope_setup_failed");
    /// assert_eq!(ScopeError::Disposed.as_label(), "scope_disposed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ScopeError::Setup { .. } => "scope_setup_failed",
            ScopeError::Disposed => "scope_disposed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ScopeError::Setup { error } => format!("setup: {error}"),
            ScopeError::Disposed => "owner disposed".to_string(),
        }
    }
}

/// # Generic operation failure.
///
/// Operations may settle with any error type; this one exists for the common
/// case of "something went wrong, here is a message".
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Operation failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },
}

impl TaskError {
    /// Builds a [`TaskError::Fail`] from anything printable.
    pub fn fail(error: impl fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_setup_keeps_message() {
        let err = ScopeError::setup("user 7 not found");
        assert_eq!(err.to_string(), "scope setup failed: user 7 not found");
        assert_eq!(err.as_message(), "setup: user 7 not found");
    }

    #[test]
    fn task_error_display() {
        let err = TaskError::fail("boom");
        assert_eq!(err.to_string(), "execution failed: boom");
        assert_eq!(err.as_label(), "task_failed");
    }

    #[test]
    fn grace_exceeded_counts_stragglers() {
        let err = RuntimeError::GraceExceeded {
            grace: Duration::from_millis(10),
            still_running: 2,
        };
        assert!(err.as_message().contains("still running=2"));
    }
}
