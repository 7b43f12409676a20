//! Observation rows and the source they are fetched from.

use crate::error::SourceError;
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Origin of an observation series.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Daily valuation and liquidity indicators (turnover rate, PE, ...)
    #[display("daily_basic")]
    DailyBasic,
    /// Daily OHLCV bars
    #[display("daily")]
    Daily,
}

impl DataSource {
    /// Every recognized source.
    pub const ALL: [Self; 2] = [Self::DailyBasic, Self::Daily];

    /// Name used in model configs and storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DailyBasic => "daily_basic",
            Self::Daily => "daily",
        }
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// One row of a time series for a single stock code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Raw trade date text; may not parse.
    pub trade_date: String,
    /// Field values keyed by field name.
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl Observation {
    /// Row with no field values.
    pub fn new(trade_date: impl Into<String>) -> Self {
        Self {
            trade_date: trade_date.into(),
            values: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Parsed trade date, accepting `YYYY-MM-DD` and `YYYYMMDD`.
    pub fn date(&self) -> Option<NaiveDate> {
        parse_trade_date(&self.trade_date)
    }

    /// Numeric value of `field`.
    ///
    /// Missing, null, non-numeric and non-finite values all read as `None`.
    /// Numeric strings such as `"2.5"` are accepted.
    pub fn value(&self, field: &str) -> Option<f64> {
        let number = match self.values.get(field)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        number.is_finite().then_some(number)
    }
}

/// Parse a trade date in either of the formats used by market data feeds.
pub fn parse_trade_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}

/// Read-only access to observation series.
///
/// Implementations may return fewer rows than there are days in the range
/// (non-trading days, suspensions) and may fail.
pub trait ObservationSource {
    /// Rows for `code` from `source` with trade dates in `[start, end]`.
    fn fetch(
        &self,
        source: DataSource,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, SourceError>;
}

impl<T: ObservationSource + ?Sized> ObservationSource for &T {
    fn fetch(
        &self,
        source: DataSource,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, SourceError> {
        (**self).fetch(source, code, start, end)
    }
}
