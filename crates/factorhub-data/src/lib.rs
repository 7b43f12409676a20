#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/factorhub/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod query;
pub mod records;
pub mod store;

pub use error::{DataError, Result};
pub use query::{
    FactorQuery, FactorSortField, FavoriteQuery, FavoriteSortField, Page, PositionQuery,
    PositionSortField, SortOrder,
};
pub use records::{
    FactorDefinition, FactorDefinitionUpdate, FactorModel, FactorModelUpdate, FactorResult,
    Favorite, NewFactorDefinition, NewFactorModel, NewFavorite, NewPosition, Position,
    PositionUpdate, StoredFactorConfig,
};
pub use store::{SqliteStore, StoreStats};

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
