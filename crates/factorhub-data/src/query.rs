//! Paging, sorting and filtering for list queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Offset/limit window over a sorted result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Rows to skip
    pub skip: usize,
    /// Maximum rows to return; `None` returns everything
    pub limit: Option<usize>,
}

impl Page {
    /// Window of at most `limit` rows after `skip`.
    pub const fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
        }
    }

    /// `LIMIT ? OFFSET ?` values; SQLite treats a negative limit as unbounded.
    pub(crate) fn bounds(self) -> (i64, i64) {
        let limit = self
            .limit
            .and_then(|limit| i64::try_from(limit).ok())
            .unwrap_or(-1);
        let skip = i64::try_from(self.skip).unwrap_or(i64::MAX);
        (limit, skip)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first
    Asc,
    /// Largest first
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("invalid sort order: {other} (expected asc or desc)")),
        }
    }
}

/// Declares a sortable-column enum with its SQL column and parse names.
macro_rules! sort_field {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $column:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Column this field sorts by.
            pub const fn column(self) -> &'static str {
                match self {
                    $(Self::$variant => $column,)+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.column())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($column => Ok(Self::$variant),)+
                    other => Err(format!(
                        "invalid sort field: {other} (expected one of: {})",
                        [$($column),+].join(", ")
                    )),
                }
            }
        }
    };
}

sort_field! {
    /// Sortable columns of factor definitions.
    FactorSortField {
        /// Row id
        Id => "id",
        /// Factor name
        FactorName => "factor_name",
        /// Creation time
        CreatedTime => "created_at",
    } default Id
}

sort_field! {
    /// Sortable columns of positions.
    PositionSortField {
        /// Row id
        Id => "id",
        /// Stock code
        Code => "code",
        /// Purchase date
        BuyDate => "buy_date",
        /// Creation time
        CreatedTime => "created_at",
    } default CreatedTime
}

sort_field! {
    /// Sortable columns of favorites.
    FavoriteSortField {
        /// Row id
        Id => "id",
        /// Stock code
        Code => "code",
        /// When the stock was added
        FavDatetime => "fav_datetime",
        /// Creation time
        CreatedTime => "created_at",
    } default CreatedTime
}

/// Filter and ordering for listing factor definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactorQuery {
    /// Only factors with this active flag
    pub enabled: Option<bool>,
    /// Window
    pub page: Page,
    /// Sort column
    pub order_by: FactorSortField,
    /// Sort direction
    pub order: SortOrder,
}

/// Filter and ordering for listing a user's positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionQuery {
    /// Only this stock code
    pub code: Option<String>,
    /// Bought on or after
    pub start_date: Option<NaiveDate>,
    /// Bought on or before
    pub end_date: Option<NaiveDate>,
    /// Window
    pub page: Page,
    /// Sort column
    pub order_by: PositionSortField,
    /// Sort direction
    pub order: SortOrder,
}

/// Filter and ordering for listing a user's favorites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteQuery {
    /// Only this stock code
    pub code: Option<String>,
    /// Window
    pub page: Page,
    /// Sort column
    pub order_by: FavoriteSortField,
    /// Sort direction
    pub order: SortOrder,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("id", PositionSortField::Id)]
    #[case("code", PositionSortField::Code)]
    #[case("buy_date", PositionSortField::BuyDate)]
    #[case("created_at", PositionSortField::CreatedTime)]
    fn test_parse_position_sort_field(#[case] raw: &str, #[case] expected: PositionSortField) {
        assert_eq!(raw.parse::<PositionSortField>(), Ok(expected));
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let err = "price; DROP TABLE positions".parse::<PositionSortField>().unwrap_err();
        assert!(err.contains("invalid sort field"));
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("ASC".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert_eq!("desc".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(Page::default().bounds(), (-1, 0));
        assert_eq!(Page::new(20, 10).bounds(), (10, 20));
    }
}
