//! Error types for the graph-object model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when constructing or validating graph objects.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A graph object is missing a required identity field.
    #[error("invalid graph object: {reason}")]
    InvalidGraphObject {
        /// Description of what is malformed.
        reason: String,
    },

    /// Two raw-data payloads on one entity share a name.
    #[error("duplicate raw data name {name:?} on entity {entity_key:?}")]
    DuplicateRawDataName {
        /// Key of the entity carrying the payloads.
        entity_key: String,
        /// The colliding payload name.
        name: String,
    },

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Creates an invalid-graph-object error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidGraphObject {
            reason: reason.into(),
        }
    }
}
