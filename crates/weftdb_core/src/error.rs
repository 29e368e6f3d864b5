//! Error types for the relational overlay.

use thiserror::Error;
use weftdb_codec::CodecError;
use weftdb_engine::EngineError;

/// Result type for overlay operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in overlay operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A foreign-key field references a non-existent parent.
    #[error("validation failed on {collection:?}.{field:?}: {message}")]
    Validation {
        /// The collection being written.
        collection: String,
        /// The offending field.
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// A `restrict` delete policy found existing dependents.
    #[error(
        "cannot delete from {collection:?}: {dependents} dependent record(s) in {dependent_collection:?}"
    )]
    ReferentialIntegrity {
        /// The collection the delete targeted.
        collection: String,
        /// The collection holding the dependents.
        dependent_collection: String,
        /// Number of dependents found.
        dependents: usize,
    },

    /// The enclosing scope was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The underlying storage engine reported a failure.
    #[error("storage engine error: {0}")]
    Engine(#[from] EngineError),

    /// Payload encode/decode failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An operation was attempted on a disposed live query.
    #[error("live query has been disposed")]
    Disposed,

    /// The named collection is not declared in the schema.
    #[error("collection not found: {name:?}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// The named relation is not declared on the collection.
    #[error("relation {relation:?} not found on collection {collection:?}")]
    RelationNotFound {
        /// The collection searched.
        collection: String,
        /// Name of the relation.
        relation: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(
        collection: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            collection: collection.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
