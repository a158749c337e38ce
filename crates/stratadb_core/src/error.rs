//! Error types for StrataDB core.

use stratadb_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in StrataDB core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// The host refused to open the database.
    #[error("failed to open database {name}: {source}")]
    Open {
        /// Database name.
        name: String,
        /// Host failure.
        source: StorageError,
    },

    /// A collection or index operation failed during the upgrade.
    #[error("migration of collection {collection} failed: {source}")]
    Migration {
        /// Collection being migrated when the failure happened.
        collection: String,
        /// Host failure.
        source: StorageError,
    },

    /// The database is not open.
    #[error("database {name} is not open")]
    NotOpen {
        /// Database name.
        name: String,
    },

    /// The database is already open or opening.
    #[error("database {name} is already open")]
    AlreadyOpen {
        /// Database name.
        name: String,
    },

    /// The collection is not declared in the schema or not in the
    /// transaction scope.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Collection name.
        name: String,
    },

    /// The index is not declared on the collection.
    #[error("unknown index {index} on collection {collection}")]
    UnknownIndex {
        /// Collection name.
        collection: String,
        /// Index name.
        index: String,
    },

    /// The host failed to release the connection.
    #[error("failed to close database {name}: {source}")]
    Close {
        /// Database name.
        name: String,
        /// Host failure.
        source: StorageError,
    },

    /// A request inside a transaction failed; the transaction is settled as
    /// failed.
    #[error("transaction failed: {source}")]
    Transaction {
        /// Host failure.
        source: StorageError,
    },

    /// Another transaction is still live.
    #[error("a transaction is already in progress on {name}")]
    TransactionInProgress {
        /// Database name.
        name: String,
    },

    /// A value cannot be used as a key or range bound.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// The schema descriptor is malformed.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a not-open error.
    pub fn not_open(name: impl Into<String>) -> Self {
        Self::NotOpen { name: name.into() }
    }

    /// Creates an unknown collection error.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the host failure behind this error, if any.
    #[must_use]
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::Open { source, .. }
            | Self::Migration { source, .. }
            | Self::Close { source, .. }
            | Self::Transaction { source } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_schema(err.to_string())
    }
}
