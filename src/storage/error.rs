//! Storage Errors
//!
//! `TigerStyle`: Explicit error types with context.

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Record not found
    #[error("memory not found: {id}")]
    NotFound {
        /// Record id that was not found
        id: String,
    },

    /// Ledger event not found
    #[error("ledger event not found: seq {seq}")]
    LedgerNotFound {
        /// Sequence number that was not found
        seq: u64,
    },

    /// Validation error
    #[error("validation error: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// Query error
    #[error("query error: {message}")]
    Query {
        /// Query error message
        message: String,
    },

    /// I/O error from a durable backend
    #[error("io error: {message}")]
    Io {
        /// I/O error message
        message: String,
    },

    /// Internal error
    #[error("internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl StoreError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a ledger-not-found error.
    #[must_use]
    pub fn ledger_not_found(seq: u64) -> Self {
        Self::LedgerNotFound { seq }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a query error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create an I/O error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
