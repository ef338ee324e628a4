//! Error types for engine operations.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur at the storage engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine refused to open the database.
    #[error("open failed: {message}")]
    Open {
        /// Description of the failure.
        message: String,
    },

    /// Another live handle prevents opening at a newer version.
    #[error("open blocked: database {name} at version {version} has live handles")]
    Blocked {
        /// Name of the database.
        name: String,
        /// The version that was requested.
        version: u32,
    },

    /// The requested version is older than the stored version.
    #[error("version too old: database {name} is at {current}, requested {requested}")]
    VersionTooOld {
        /// Name of the database.
        name: String,
        /// The version that was requested.
        requested: u32,
        /// The version the database is currently at.
        current: u32,
    },

    /// A unique constraint was violated.
    #[error("constraint violation on index {index} of collection {collection}")]
    Constraint {
        /// Collection where the violation occurred.
        collection: String,
        /// The violated index (`"primary"` for the primary key).
        index: String,
    },

    /// Collection does not exist.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// Collection already exists.
    #[error("collection already exists: {name}")]
    CollectionExists {
        /// Name of the collection.
        name: String,
    },

    /// Index does not exist on the collection.
    #[error("index not found: {name} on collection {collection}")]
    IndexNotFound {
        /// Collection the index was looked up on.
        collection: String,
        /// Name of the index.
        name: String,
    },

    /// Index already exists on the collection.
    #[error("index already exists: {name} on collection {collection}")]
    IndexExists {
        /// Collection the index was created on.
        collection: String,
        /// Name of the index.
        name: String,
    },

    /// A record is missing a value at the collection's key path.
    #[error("record has no key at path {key_path} in collection {collection}")]
    MissingKey {
        /// Collection the record was written to.
        collection: String,
        /// The collection's key path.
        key_path: String,
    },

    /// A write was attempted on a read-only transaction.
    #[error("read-only transaction cannot write to collection {collection}")]
    ReadOnly {
        /// Collection the write targeted.
        collection: String,
    },

    /// The transaction can no longer be used.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// The handle is closed.
    #[error("database handle is closed")]
    Closed,
}

impl EngineError {
    /// Creates an open failure.
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /// Creates a constraint violation.
    pub fn constraint(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Self::Constraint {
            collection: collection.into(),
            index: index.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }
}
