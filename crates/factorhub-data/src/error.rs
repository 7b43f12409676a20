//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Record does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier that was looked up
        key: String,
    },

    /// Record would violate a uniqueness rule
    #[error("{entity} already exists: {key}")]
    Duplicate {
        /// Kind of record
        entity: &'static str,
        /// Conflicting identifier
        key: String,
    },

    /// Input rejected before writing
    #[error("Validation error: {0}")]
    Validation(String),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),
}

impl DataError {
    /// Missing record.
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Conflicting record.
    pub fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        Self::Duplicate {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether this is a missing-record error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
