//! Failure taxonomy for intent execution.
//!
//! Every failure an executor can produce is classified into a
//! [`FailureKind`] whose retryability the poller reads back from the sealed
//! run record. Classification travels by value, never by downcasting, so
//! the poll loop can decide retry-vs-terminal without inspecting error
//! types.

use serde::{Deserialize, Serialize};

/// Three-way classification of content-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested artifact (or the parent of an upload) does not exist.
    #[error("content not found: {0}")]
    NotFound(String),

    /// Timeout, connection failure, or a 5xx from the content service.
    /// Worth retrying after a backoff.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Malformed response or a non-retryable status code.
    #[error("fatal store error: {0}")]
    Fatal(String),
}

/// Error raised by a processing function. Always treated as retryable by
/// the executor (model cold starts and resource exhaustion look identical
/// to permanent faults from the outside).
#[derive(Debug, thiserror::Error)]
#[error("processing failed: {0}")]
pub struct ProcessingError(pub String);

/// Backend failure from a backlog implementation.
#[derive(Debug, thiserror::Error)]
pub enum BacklogError {
    /// The underlying store rejected or failed the operation.
    #[error("backlog backend error: {0}")]
    Backend(String),
}

/// Classification of a failed execution attempt.
///
/// Serialized into `WorkflowRun::error_detail`, so the variant names are
/// part of the persisted record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network timeout, 5xx, or claim contention. Retried with backoff.
    Transient,
    /// Input artifact missing, or the upload parent vanished. Terminal.
    NotFound,
    /// No capability registered for the intent's workflow name. Terminal.
    UnsupportedWorkflow,
    /// The payload is missing a required field. Terminal.
    MalformedPayload,
    /// Malformed response from the content service. Terminal.
    Fatal,
    /// The processing function itself failed. Retried with backoff.
    Processing,
    /// The claim pushed `attempt_count` past `max_attempts`. Terminal.
    MaxAttemptsExceeded,
}

impl FailureKind {
    /// Whether the poller should make the intent claimable again.
    pub fn retryable(self) -> bool {
        matches!(self, FailureKind::Transient | FailureKind::Processing)
    }
}

/// A classified execution failure, sealed into the run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure for a workflow name with no registered capability. The
    /// message enumerates the supported names for operator diagnostics.
    pub fn unsupported(name: &str, supported: &[String]) -> Self {
        Self::new(
            FailureKind::UnsupportedWorkflow,
            format!("unknown workflow \"{name}\"; supported: {supported:?}"),
        )
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    /// Map a content-store failure into the taxonomy. The same mapping
    /// applies to downloads and uploads: only timeouts/5xx are retryable;
    /// a missing artifact (or a vanished upload parent) is terminal.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::new(FailureKind::NotFound, msg),
            StoreError::Transient(msg) => Self::new(FailureKind::Transient, msg),
            StoreError::Fatal(msg) => Self::new(FailureKind::Fatal, msg),
        }
    }
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
