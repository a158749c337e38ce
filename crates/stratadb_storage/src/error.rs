//! Error types for host store operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by a host store.
///
/// The variants follow the failure classes a browser-style versioned store
/// reports, so a backend wrapping a real host can map onto them directly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// A named database, object store or index does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A uniqueness or existence constraint was violated.
    #[error("constraint violated: {message}")]
    ConstraintError {
        /// Description of the violation.
        message: String,
    },

    /// A value could not be used as a key, or a key could not be resolved.
    #[error("data error: {message}")]
    DataError {
        /// Description of the problem.
        message: String,
    },

    /// The requested version is lower than the stored one.
    #[error("version error: requested {requested}, stored {stored}")]
    VersionError {
        /// Version passed to open.
        requested: u64,
        /// Version currently stored.
        stored: u64,
    },

    /// Version zero was requested.
    #[error("invalid version: {0}")]
    InvalidVersion(u64),

    /// Another connection kept the database open through a version change.
    #[error("database {name} is blocked by {open_connections} open connection(s)")]
    Blocked {
        /// Database name.
        name: String,
        /// Number of connections that did not close.
        open_connections: usize,
    },

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction scope is not acceptable.
    #[error("invalid access: {message}")]
    InvalidAccess {
        /// Description of the problem.
        message: String,
    },

    /// The transaction already finished.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// Record encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The connection or database was closed underneath the caller.
    #[error("connection is closed")]
    Closed,

    /// The upgrade callback rejected the version change.
    #[error("upgrade aborted: {reason}")]
    UpgradeAborted {
        /// Reason reported by the callback.
        reason: String,
    },
}

impl StorageError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintError {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::DataError {
            message: message.into(),
        }
    }

    /// Creates an invalid access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }

    /// Creates an upgrade aborted error.
    pub fn upgrade_aborted(reason: impl Into<String>) -> Self {
        Self::UpgradeAborted {
            reason: reason.into(),
        }
    }

    /// Returns true for uniqueness and existence violations.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::ConstraintError { .. })
    }
}
