//! Error types for the graph-object store.

use graphsync_model::ModelError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A graph object failed key/type validation.
    #[error("invalid graph object: {0}")]
    InvalidGraphObject(#[from] ModelError),

    /// A `_key` was added twice with conflicting `_type` values.
    #[error(
        "duplicate key {key:?}: already staged with type {existing_type:?}, \
         incoming type {incoming_type:?}"
    )]
    DuplicateKey {
        /// The colliding key.
        key: String,
        /// Type already recorded for the key.
        existing_type: String,
        /// Type of the rejected incoming object.
        incoming_type: String,
    },

    /// A flush callback reported a failure.
    #[error("flush callback failed: {message}")]
    FlushCallback {
        /// Description of the downstream failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a flush-callback failure.
    pub fn flush_callback(message: impl Into<String>) -> Self {
        Self::FlushCallback {
            message: message.into(),
        }
    }
}
