#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/factorhub/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod calculation;
pub mod error;
pub mod portfolio;
pub mod seed;
pub mod service;

// Re-export main types from sub-crates
pub use factorhub_data as data;
pub use factorhub_factors as factors;

pub use calculation::{CalculationRequest, CalculationSummary, CodeError};
pub use error::{Result, ServiceError};
pub use portfolio::PortfolioService;
pub use seed::{MA_EXAMPLE_CODES, SeedReport, TURNOVER_RATE};
pub use service::{FactorService, MatchKind, Resolution};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
