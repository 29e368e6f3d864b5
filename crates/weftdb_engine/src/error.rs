//! Error types for storage-engine operations.

use thiserror::Error;
use weftdb_codec::{CodecError, Key};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An insert collided with an existing key.
    #[error("duplicate key {key} in collection {collection:?}")]
    DuplicateKey {
        /// The collection the insert targeted.
        collection: String,
        /// The colliding key.
        key: Key,
    },

    /// A unique index would contain two records with the same index key.
    #[error("unique index {index:?} on {collection:?} violated by key {key}")]
    UniqueConstraint {
        /// The collection being written.
        collection: String,
        /// The violated index.
        index: String,
        /// The duplicated index key.
        key: Key,
    },

    /// The named collection does not exist.
    #[error("collection not found: {name:?}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// The named index does not exist on the collection.
    #[error("index {index:?} not found on collection {collection:?}")]
    IndexNotFound {
        /// The collection searched.
        collection: String,
        /// Name of the index.
        index: String,
    },

    /// A collection was accessed that the transaction scope did not declare.
    #[error("collection {collection:?} is outside the transaction scope")]
    OutOfScope {
        /// The undeclared collection.
        collection: String,
    },

    /// A mutation was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// An operation was attempted on an already-settled transaction.
    #[error("transaction already settled")]
    TransactionSettled,

    /// An insert had no explicit key, no key path, and no auto-key.
    #[error("no key for insert into {collection:?}: collection has no key path or auto-key")]
    MissingKey {
        /// The collection the insert targeted.
        collection: String,
    },

    /// Payload encode/decode failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The engine's internal state is inconsistent.
    #[error("engine corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

impl EngineError {
    /// Creates a duplicate-key error.
    pub fn duplicate_key(collection: impl Into<String>, key: Key) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            key,
        }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an out-of-scope error.
    pub fn out_of_scope(collection: impl Into<String>) -> Self {
        Self::OutOfScope {
            collection: collection.into(),
        }
    }

    /// Creates a corrupted-state error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
