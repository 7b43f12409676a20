//! Turnover Rate Factor
//!
//! Reads the daily turnover rate of a stock, either as the raw value for the
//! as-of date or as a trailing moving average over the most recent valid
//! trading days.

use crate::calculator::FactorCalculator;
use crate::error::ModelConfigError;
use crate::source::{DataSource, Observation, ObservationSource};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Largest accepted moving-average window, in trading days.
pub const MAX_WINDOW: i64 = 60;

/// Model parameters for the turnover-rate calculator.
///
/// Fields are kept as given in the model config and checked by
/// [`TurnoverRateConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnoverRateConfig {
    /// Observation source name (default: `daily_basic`)
    #[serde(default = "default_source")]
    pub source: String,
    /// Field to read (default: `turnover_rate`)
    #[serde(default = "default_field")]
    pub field: String,
    /// `None` or `"raw"` for the raw value, `"ma"` for a moving average
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Moving-average window (default: 5), kept as given so that
    /// non-integers are reported as window errors
    #[serde(default = "default_window")]
    pub window: Value,
}

fn default_source() -> String {
    DataSource::DailyBasic.as_str().to_string()
}

fn default_field() -> String {
    "turnover_rate".to_string()
}

fn default_window() -> Value {
    Value::from(5)
}

impl Default for TurnoverRateConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            field: default_field(),
            method: None,
            window: default_window(),
        }
    }
}

/// How observations are reduced to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Value on the as-of date
    Raw,
    /// Mean of the last `window` valid observations
    MovingAverage {
        /// Number of trading days averaged
        window: usize,
    },
}

impl TurnoverRateConfig {
    /// Moving-average config over `window` days.
    pub fn moving_average(window: i64) -> Self {
        Self {
            method: Some("ma".to_string()),
            window: Value::from(window),
            ..Self::default()
        }
    }

    /// Check the parameters and return the parsed source and method.
    pub fn validate(&self) -> Result<(DataSource, Method), ModelConfigError> {
        let source = self
            .source
            .parse::<DataSource>()
            .map_err(ModelConfigError::UnsupportedSource)?;

        if self.field.trim().is_empty() {
            return Err(ModelConfigError::EmptyField);
        }

        let method = match self.method.as_deref() {
            None | Some("raw") => Method::Raw,
            Some("ma") => {
                let not_positive = || ModelConfigError::WindowNotPositive(self.window.to_string());
                let window = self
                    .window
                    .as_i64()
                    .filter(|w| *w > 0)
                    .ok_or_else(not_positive)?;
                if window > MAX_WINDOW {
                    return Err(ModelConfigError::WindowTooLarge {
                        window,
                        max: MAX_WINDOW,
                    });
                }
                let window = usize::try_from(window).map_err(|_| not_positive())?;
                Method::MovingAverage { window }
            }
            Some(other) => return Err(ModelConfigError::UnsupportedMethod(other.to_string())),
        };

        Ok((source, method))
    }
}

/// Calendar days fetched before the as-of date for a moving average.
///
/// Wide enough to span weekends, holidays and short suspensions.
pub const fn lookback_days(window: usize) -> i64 {
    window as i64 * 3 + 10
}

/// Turnover-rate calculator.
#[derive(Debug, Clone, Default)]
pub struct TurnoverRateCalculator {
    config: TurnoverRateConfig,
}

impl TurnoverRateCalculator {
    /// Calculator with the given parameters.
    pub const fn with_config(config: TurnoverRateConfig) -> Self {
        Self { config }
    }

    /// Parameters this calculator was built with.
    pub const fn config(&self) -> &TurnoverRateConfig {
        &self.config
    }

    fn raw_value(
        &self,
        source: &dyn ObservationSource,
        data_source: DataSource,
        code: &str,
        date: NaiveDate,
    ) -> Option<f64> {
        let rows = fetch_or_warn(source, data_source, code, date, date)?;
        rows.iter()
            .find(|row| row.date() == Some(date))
            .and_then(|row| row.value(&self.config.field))
    }

    fn moving_average(
        &self,
        source: &dyn ObservationSource,
        data_source: DataSource,
        code: &str,
        date: NaiveDate,
        window: usize,
    ) -> Option<f64> {
        let start = date - Duration::days(lookback_days(window));
        let rows = fetch_or_warn(source, data_source, code, start, date)?;

        let mut valid: Vec<(NaiveDate, f64)> = rows
            .iter()
            .filter_map(|row| {
                let day = row.date()?;
                let value = row.value(&self.config.field)?;
                (day <= date).then_some((day, value))
            })
            .collect();

        if valid.len() < window {
            debug!(
                code,
                %date,
                window,
                valid = valid.len(),
                "insufficient observations for moving average"
            );
            return None;
        }

        valid.sort_by_key(|(day, _)| *day);
        let tail = &valid[valid.len() - window..];
        Some(tail.iter().map(|(_, value)| value).sum::<f64>() / window as f64)
    }
}

fn fetch_or_warn(
    source: &dyn ObservationSource,
    data_source: DataSource,
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<Vec<Observation>> {
    match source.fetch(data_source, code, start, end) {
        Ok(rows) => Some(rows),
        Err(err) => {
            warn!(code, %start, %end, source = %data_source, error = %err, "observation fetch failed");
            None
        }
    }
}

impl FactorCalculator for TurnoverRateCalculator {
    fn name(&self) -> &str {
        "turnover_rate"
    }

    fn validate_config(&self) -> Result<(), ModelConfigError> {
        self.config.validate().map(|_| ())
    }

    fn calculate(
        &self,
        source: &dyn ObservationSource,
        code: &str,
        date: NaiveDate,
    ) -> Option<f64> {
        let (data_source, method) = match self.config.validate() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(code, %date, error = %err, "invalid turnover rate config");
                return None;
            }
        };

        match method {
            Method::Raw => self.raw_value(source, data_source, code, date),
            Method::MovingAverage { window } => {
                self.moving_average(source, data_source, code, date, window)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::cell::RefCell;

    type Request = (DataSource, String, NaiveDate, NaiveDate);

    #[derive(Default)]
    struct StubSource {
        rows: Vec<Observation>,
        fail: bool,
        requests: RefCell<Vec<Request>>,
    }

    impl StubSource {
        fn with_rows(rows: Vec<Observation>) -> Self {
            Self {
                rows,
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    impl ObservationSource for StubSource {
        fn fetch(
            &self,
            source: DataSource,
            code: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<Observation>, SourceError> {
            self.requests
                .borrow_mut()
                .push((source, code.to_string(), start, end));
            if self.fail {
                return Err(SourceError::new("database connection failed"));
            }
            Ok(self.rows.clone())
        }
    }

    const CODE: &str = "000001.SZ";

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn days_before(days: i64) -> String {
        (as_of() - Duration::days(days)).to_string()
    }

    fn row(trade_date: impl Into<String>, value: impl Into<Value>) -> Observation {
        Observation::new(trade_date).with("turnover_rate", value)
    }

    /// Five consecutive days ending at the as-of date: 2.0, 2.1, 2.2, 2.3, 2.4.
    fn five_day_series() -> Vec<Observation> {
        (0..5)
            .map(|i| row(days_before(4 - i), 2.0 + i as f64 * 0.1))
            .collect()
    }

    fn raw() -> TurnoverRateCalculator {
        TurnoverRateCalculator::default()
    }

    fn ma(window: i64) -> TurnoverRateCalculator {
        TurnoverRateCalculator::with_config(TurnoverRateConfig::moving_average(window))
    }

    #[test]
    fn test_default_config() {
        let config = TurnoverRateConfig::default();
        assert_eq!(config.source, "daily_basic");
        assert_eq!(config.field, "turnover_rate");
        assert_eq!(config.method, None);
        assert_eq!(config.window, json!(5));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TurnoverRateConfig = serde_json::from_value(json!({"method": "ma"})).unwrap();
        assert_eq!(config, TurnoverRateConfig::moving_average(5));
    }

    #[test]
    fn test_raw_returns_value_for_date() {
        let source = StubSource::with_rows(vec![row("2025-01-10", 2.5)]);
        assert_eq!(raw().calculate(&source, CODE, as_of()), Some(2.5));

        let requests = source.requests.borrow();
        assert_eq!(
            requests.as_slice(),
            &[(DataSource::DailyBasic, CODE.to_string(), as_of(), as_of())]
        );
    }

    #[test]
    fn test_raw_no_data() {
        let source = StubSource::with_rows(Vec::new());
        assert_eq!(raw().calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_raw_null_value() {
        let source = StubSource::with_rows(vec![row("2025-01-10", Value::Null)]);
        assert_eq!(raw().calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_raw_non_numeric_value() {
        let source = StubSource::with_rows(vec![row("2025-01-10", "invalid")]);
        assert_eq!(raw().calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_raw_custom_field() {
        let source =
            StubSource::with_rows(vec![Observation::new("2025-01-10").with("turnover_rate_f", 3.2)]);
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            field: "turnover_rate_f".to_string(),
            ..TurnoverRateConfig::default()
        });
        assert_eq!(calculator.calculate(&source, CODE, as_of()), Some(3.2));
    }

    #[test]
    fn test_raw_compact_date_format() {
        let source = StubSource::with_rows(vec![row("20250110", 1.75)]);
        assert_eq!(raw().calculate(&source, CODE, as_of()), Some(1.75));
    }

    #[test]
    fn test_raw_daily_source_is_requested() {
        let source = StubSource::with_rows(vec![Observation::new("2025-01-10").with("vol", 1000)]);
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            source: "daily".to_string(),
            field: "vol".to_string(),
            ..TurnoverRateConfig::default()
        });
        assert_eq!(calculator.calculate(&source, CODE, as_of()), Some(1000.0));
        assert_eq!(source.requests.borrow()[0].0, DataSource::Daily);
    }

    #[test]
    fn test_ma_mean_of_window() {
        let source = StubSource::with_rows(five_day_series());
        let value = ma(5).calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 2.2, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_fetch_range_covers_gaps() {
        let source = StubSource::with_rows(five_day_series());
        let _ = ma(5).calculate(&source, CODE, as_of());

        let requests = source.requests.borrow();
        let (_, _, start, end) = &requests[0];
        assert_eq!(*end, as_of());
        assert_eq!(*start, as_of() - Duration::days(25));
    }

    #[test]
    fn test_ma_default_window() {
        let source = StubSource::with_rows(five_day_series());
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            method: Some("ma".to_string()),
            ..TurnoverRateConfig::default()
        });
        let value = calculator.calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 2.2, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_insufficient_data() {
        let source = StubSource::with_rows(vec![row(days_before(2), 2.0), row(days_before(1), 2.1)]);
        assert_eq!(ma(5).calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_ma_with_missing_days() {
        let rows = [6, 5, 3, 2, 1]
            .into_iter()
            .enumerate()
            .map(|(i, days)| row(days_before(days), 2.0 + i as f64 * 0.1))
            .collect();
        let source = StubSource::with_rows(rows);
        let value = ma(5).calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 2.2, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_custom_window_uses_most_recent() {
        let rows = (0..10)
            .map(|i| row(days_before(9 - i), 1.0 + i as f64 * 0.1))
            .collect();
        let source = StubSource::with_rows(rows);
        let value = ma(3).calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 1.8, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_filters_null_values() {
        let source = StubSource::with_rows(vec![
            row(days_before(4), 2.0),
            row(days_before(3), Value::Null),
            row(days_before(2), 2.2),
            row(days_before(1), Value::Null),
            row(days_before(0), 2.4),
            row(days_before(5), 1.9),
            row(days_before(6), 1.8),
        ]);
        let value = ma(5).calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 2.06, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_single_record() {
        let source = StubSource::with_rows(vec![row(days_before(0), 2.5)]);
        assert_eq!(ma(1).calculate(&source, CODE, as_of()), Some(2.5));
    }

    #[test]
    fn test_ma_all_null_values() {
        let rows = (0..5).map(|i| row(days_before(i), Value::Null)).collect();
        let source = StubSource::with_rows(rows);
        assert_eq!(ma(5).calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_ma_four_valid_among_nulls_is_insufficient() {
        let source = StubSource::with_rows(vec![
            row(days_before(4), 2.0),
            row(days_before(3), Value::Null),
            row(days_before(2), 2.2),
            row(days_before(1), 2.3),
            row(days_before(0), 2.4),
        ]);
        assert_eq!(ma(5).calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_ma_order_independent() {
        let source = StubSource::with_rows(vec![
            row(days_before(2), 2.2),
            row(days_before(4), 2.0),
            row(days_before(0), 2.4),
            row(days_before(1), 2.3),
            row(days_before(3), 2.1),
        ]);
        let value = ma(5).calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 2.2, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_skips_invalid_dates() {
        let source = StubSource::with_rows(vec![
            row("invalid-date", 2.0),
            row(days_before(1), 2.1),
            row(days_before(2), 2.2),
            row(days_before(3), 2.3),
            row(days_before(4), 2.4),
        ]);
        assert_eq!(ma(5).calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_ma_drops_rows_after_as_of_date() {
        let mut rows = five_day_series();
        rows.push(row((as_of() + Duration::days(1)).to_string(), 100.0));
        let source = StubSource::with_rows(rows);
        let value = ma(5).calculate(&source, CODE, as_of()).unwrap();
        assert_relative_eq!(value, 2.2, epsilon = 1e-9);
    }

    #[test]
    fn test_ma_accepts_numeric_strings() {
        let rows = (0..3).map(|i| row(days_before(i), "1.5")).collect();
        let source = StubSource::with_rows(rows);
        assert_eq!(ma(3).calculate(&source, CODE, as_of()), Some(1.5));
    }

    #[rstest]
    #[case(raw())]
    #[case(ma(5))]
    fn test_fetch_failure_yields_none(#[case] calculator: TurnoverRateCalculator) {
        let source = StubSource::failing();
        assert_eq!(calculator.calculate(&source, CODE, as_of()), None);
    }

    #[test]
    fn test_invalid_config_yields_none_without_fetch() {
        let source = StubSource::with_rows(five_day_series());
        let calculator = ma(0);
        assert_eq!(calculator.calculate(&source, CODE, as_of()), None);
        assert!(source.requests.borrow().is_empty());
    }

    #[test]
    fn test_validate_config_valid() {
        assert!(raw().validate_config().is_ok());
        assert!(ma(5).validate_config().is_ok());
        assert!(ma(60).validate_config().is_ok());
    }

    #[test]
    fn test_validate_config_invalid_source() {
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            source: "bogus".to_string(),
            ..TurnoverRateConfig::default()
        });
        let err = calculator.validate_config().unwrap_err();
        assert_eq!(err, ModelConfigError::UnsupportedSource("bogus".to_string()));
        assert!(err.to_string().contains("Unsupported data source"));
    }

    #[test]
    fn test_validate_config_empty_field() {
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            field: String::new(),
            ..TurnoverRateConfig::default()
        });
        let err = calculator.validate_config().unwrap_err();
        assert_eq!(err, ModelConfigError::EmptyField);
        assert!(err.to_string().contains("Field name"));
    }

    #[rstest]
    #[case(-1)]
    #[case(0)]
    fn test_validate_config_window_not_positive(#[case] window: i64) {
        let err = ma(window).validate_config().unwrap_err();
        assert!(err.to_string().contains("must be a positive integer"));
    }

    #[rstest]
    #[case(json!(5.0), "5.0")]
    #[case(json!("5"), "\"5\"")]
    #[case(Value::Null, "null")]
    fn test_validate_config_window_not_integer(#[case] window: Value, #[case] shown: &str) {
        let config: TurnoverRateConfig =
            serde_json::from_value(json!({"method": "ma", "window": window})).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err, ModelConfigError::WindowNotPositive(shown.to_string()));
        assert!(err.to_string().contains("must be a positive integer"));
    }

    #[test]
    fn test_validate_config_window_too_large() {
        let err = ma(61).validate_config().unwrap_err();
        assert!(err.to_string().contains("must not exceed 60"));
    }

    #[test]
    fn test_validate_config_window_ignored_for_raw() {
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            window: json!(0),
            ..TurnoverRateConfig::default()
        });
        assert!(calculator.validate_config().is_ok());
    }

    #[test]
    fn test_validate_config_unknown_method() {
        let calculator = TurnoverRateCalculator::with_config(TurnoverRateConfig {
            method: Some("ewma".to_string()),
            ..TurnoverRateConfig::default()
        });
        assert_eq!(
            calculator.validate_config().unwrap_err(),
            ModelConfigError::UnsupportedMethod("ewma".to_string())
        );
    }
}
