//! Error types for service operations.

use factorhub_data::DataError;
use factorhub_factors::{ConfigRejection, FactorError};
use thiserror::Error;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by [`crate::FactorService`] and [`crate::PortfolioService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage failure or missing/duplicate record
    #[error(transparent)]
    Data(#[from] DataError),

    /// Calculator construction or model config failure
    #[error(transparent)]
    Factor(#[from] FactorError),

    /// Factor config rejected before it was written
    #[error("Invalid factor config: {0}")]
    Rejected(#[from] ConfigRejection),

    /// Input rejected before it was written
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    /// Whether the error means a record does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Data(err) if err.is_not_found())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
