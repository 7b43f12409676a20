//! Error types for factor configuration and calculation.

use crate::config::ConfigRejection;
use thiserror::Error;

/// Result type for factor operations.
pub type Result<T> = std::result::Result<T, FactorError>;

/// Errors that can occur while validating or building factor calculators.
#[derive(Debug, Error)]
pub enum FactorError {
    /// Factor configuration rejected at write time
    #[error("Invalid factor config: {0}")]
    Rejected(#[from] ConfigRejection),

    /// Calculator (model) configuration is invalid
    #[error("Invalid model config: {0}")]
    ModelConfig(#[from] ModelConfigError),

    /// Model config JSON could not be decoded
    #[error("Malformed model config: {0}")]
    MalformedConfig(#[from] serde_json::Error),

    /// No calculator is registered under this factor name
    #[error("No calculator registered for factor: {0}")]
    UnknownCalculator(String),
}

/// Reasons a calculator configuration fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelConfigError {
    /// The `source` key names a data origin that does not exist
    #[error("Unsupported data source: {0}")]
    UnsupportedSource(String),

    /// The `field` key is empty
    #[error("Field name must not be empty")]
    EmptyField,

    /// The `method` key names an aggregation that does not exist
    #[error("Unsupported calculation method: {0}")]
    UnsupportedMethod(String),

    /// Moving-average window is not a positive integer
    #[error("Moving average window must be a positive integer, got {0}")]
    WindowNotPositive(String),

    /// Moving-average window exceeds the maximum
    #[error("Moving average window must not exceed {max}, got {window}")]
    WindowTooLarge {
        /// Requested window
        window: i64,
        /// Largest accepted window
        max: i64,
    },
}

/// Failure reported by an observation source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Observation fetch failed: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    /// Wrap any displayable error.
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string())
    }
}
