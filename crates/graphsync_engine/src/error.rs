//! Error types for the synchronization engine.

use graphsync_model::JobStatus;
use graphsync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while driving a synchronization run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The remote service rejected the credential. Never retried.
    #[error("API request error for {url}: 403 Forbidden")]
    Forbidden {
        /// URL of the rejected request.
        url: String,
    },

    /// The retry budget ran out on a transient failure.
    #[error("could not complete request within {attempts} attempts")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// A non-retryable API response.
    #[error("API request error for {url}: {status}")]
    Api {
        /// URL of the failed request.
        url: String,
        /// HTTP status returned.
        status: u16,
    },

    /// Network-level failure reported by the HTTP client.
    #[error("transport error: {message}")]
    Transport {
        /// Error message from the client.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// Store failure surfaced through a flush.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payload serialization or response parsing failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job-status transition that the lattice forbids.
    #[error("invalid job state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// An operation needed a job that has not been created yet.
    #[error("synchronization job has not been created")]
    JobNotCreated,

    /// A collection step failed fatally.
    #[error("step {step_id:?} failed: {message}")]
    StepFailed {
        /// The failing step.
        step_id: String,
        /// The step's error.
        message: String,
    },
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport { retryable: true, .. })
    }
}
