//! Error types for Coffer core.

use coffer_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Coffer core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The engine refused to open a database.
    #[error("open failed: {message}")]
    Open {
        /// Description of the failure.
        message: String,
    },

    /// Another live handle prevents the open or upgrade.
    #[error("open blocked: database {name} has live handles at an older version")]
    Blocked {
        /// Name of the database.
        name: String,
    },

    /// A version record with the same name already exists.
    #[error("duplicate database name: {name}")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// No version record exists for the name.
    #[error("no version record for database: {name}")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A unique constraint was violated.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// The version registry has not been initialized.
    #[error("version registry is not initialized")]
    NotInitialized,

    /// A schema change was requested outside an upgrade transition.
    #[error("schema change outside upgrade transition")]
    SchemaChangeOutsideUpgrade,

    /// A record could not be serialized or deserialized.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an open failure.
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /// Creates a duplicate name error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Creates a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Remaps engine open failures to the domain open/blocked variants.
    pub(crate) fn from_open_failure(name: &str, error: EngineError) -> Self {
        match error {
            EngineError::Blocked { name, .. } => Self::Blocked { name },
            EngineError::Constraint { collection, index } => Self::Constraint {
                message: format!("index {index} on collection {collection}"),
            },
            other => Self::Open {
                message: format!("{name}: {other}"),
            },
        }
    }
}
