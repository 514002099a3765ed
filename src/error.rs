use crate::resources::Resources;
use crate::types::{RequestKind, TrialId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a trial's resource request cannot currently be admitted.
    ///
    /// This is expected backpressure, not a failure: the trial stays pending
    /// and is retried on a later scheduling pass. Repeated occurrences are the
    /// implicit signal for an external autoscaler to grow the cluster.
    #[error("insufficient cluster resources for request {requested}")]
    ResourceUnavailable {
        /// The resource request that could not be admitted.
        requested: Resources,
    },

    /// Returned when a remote start/step/save/restore request raised.
    ///
    /// Counted against the trial's retry budget and normally consumed by the
    /// recovery policy; it only propagates out of the control loop under
    /// [`FailFast::Raise`](crate::FailFast::Raise).
    #[error("remote {kind} request failed for trial {trial}: {message}")]
    RemoteExecution {
        /// The trial whose remote request failed.
        trial: TrialId,
        /// The kind of request that failed.
        kind: RequestKind,
        /// The failure message reported by the worker.
        message: String,
    },

    /// Returned when committing a resource request would exceed capacity.
    ///
    /// Callers are expected to check admission first, so this indicates a bug
    /// in admission logic rather than a runtime condition.
    #[error("resource over-commit on '{resource}': requested {requested}, available {available}")]
    OverCommit {
        /// The resource name that would be over-committed.
        resource: String,
        /// The additional amount requested.
        requested: f64,
        /// The amount still available for that resource.
        available: f64,
    },

    /// Returned when stepping a runner that has nothing left to process.
    #[error("no trials left to process")]
    NoRunnableTrials,

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Failure reported by a remote worker operation.
///
/// Workers return this from [`Worker`](crate::worker::Worker) methods to
/// signal that an operation raised on the remote side. The control loop
/// converts it into [`Error::RemoteExecution`] during classification, tagging
/// it with the trial and request kind.
///
/// # Examples
///
/// ```
/// use tuner::WorkerFailure;
///
/// let failure = WorkerFailure::new("CUDA out of memory");
/// assert_eq!(failure.to_string(), "CUDA out of memory");
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct WorkerFailure(String);

impl WorkerFailure {
    /// Create a failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for WorkerFailure {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for WorkerFailure {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}
