//! Error types for the segue runtime
//!
//! Scheduler defects and escalations use thiserror; the worker side has its
//! own small vocabulary (`Interrupted`, `Escape`) that interpreters propagate
//! with `?`.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors surfaced to the driver by [`Scheduler`](super::Scheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `load` was called while a source was loaded or a worker was alive.
    #[error("cannot load code while other code is still loaded or running")]
    Reentry,

    /// `step` was called with nothing loaded and no worker alive.
    #[error("step called with no code loaded")]
    NotLoaded,

    /// The handoff protocol was violated; the worker has been torn down.
    #[error("worker protocol violated: {0}")]
    Protocol(String),

    /// Running code asked for process termination. The worker has already
    /// been torn down when this is returned.
    #[error("{0}")]
    WorkerExit(ExitRequest),

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

impl SchedulerError {
    /// Whether this error indicates a bug in the caller or in the scheduler
    /// itself rather than a runtime condition.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            SchedulerError::Reentry | SchedulerError::NotLoaded | SchedulerError::Protocol(_)
        )
    }

    /// The exit request carried by a termination escalation, if any.
    pub fn exit_request(&self) -> Option<ExitRequest> {
        match self {
            SchedulerError::WorkerExit(request) => Some(*request),
            _ => None,
        }
    }
}

/// Convenience result alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Raised inside the worker when an interrupt reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

impl Interrupted {
    /// Whether an `io::Error` produced by an [`OutputRelay`](super::OutputRelay)
    /// carries an interrupt.
    pub fn in_io(err: &io::Error) -> bool {
        err.get_ref()
            .is_some_and(|inner| inner.downcast_ref::<Interrupted>().is_some())
    }
}

impl From<Interrupted> for io::Error {
    fn from(interrupted: Interrupted) -> Self {
        // Not ErrorKind::Interrupted: write_all would silently retry it.
        io::Error::other(interrupted)
    }
}

/// A request from running code to terminate the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequest {
    /// Requested process exit status.
    pub code: i32,
}

impl ExitRequest {
    /// Create an exit request with the given status.
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

impl fmt::Display for ExitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit requested by running code (status {})", self.code)
    }
}

/// Non-local exits an interpreter may take out of `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Escape {
    /// An interrupt was not caught by the running code.
    #[error("interrupted")]
    Interrupted,

    /// The running code asked for process termination.
    #[error("{0}")]
    Exit(ExitRequest),
}

impl From<Interrupted> for Escape {
    fn from(_: Interrupted) -> Self {
        Escape::Interrupted
    }
}

impl From<ExitRequest> for Escape {
    fn from(request: ExitRequest) -> Self {
        Escape::Exit(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_classification() {
        assert!(SchedulerError::Reentry.is_defect());
        assert!(SchedulerError::Protocol("lost".into()).is_defect());
        assert!(!SchedulerError::WorkerExit(ExitRequest::new(3)).is_defect());
    }

    #[test]
    fn test_interrupt_survives_io_error() {
        let err: io::Error = Interrupted.into();
        assert_ne!(err.kind(), io::ErrorKind::Interrupted);
        assert!(Interrupted::in_io(&err));
        assert!(!Interrupted::in_io(&io::Error::other("disk full")));
    }

    #[test]
    fn test_exit_request_display() {
        let err = SchedulerError::WorkerExit(ExitRequest::new(2));
        assert_eq!(err.to_string(), "exit requested by running code (status 2)");
        assert_eq!(err.exit_request(), Some(ExitRequest::new(2)));
    }
}
