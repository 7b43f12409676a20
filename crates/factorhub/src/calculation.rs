//! Batch factor calculation over stored observations.

use crate::error::{Result, ServiceError};
use crate::service::FactorService;
use chrono::{NaiveDate, Utc};
use factorhub_data::{FactorModel, FactorResult};
use factorhub_factors::{DataSource, FactorCalculator, ModelId};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// What to calculate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// Factor to calculate
    pub factor_id: i64,
    /// Codes to process; every code with observations in range when absent
    pub codes: Option<Vec<String>>,
    /// First trade date (inclusive)
    pub start: NaiveDate,
    /// Last trade date (inclusive)
    pub end: NaiveDate,
    /// Recorded on every written value
    pub created_by: Option<String>,
}

impl CalculationRequest {
    /// Request for every code in `[start, end]`.
    pub const fn new(factor_id: i64, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            factor_id,
            codes: None,
            start,
            end,
            created_by: None,
        }
    }

    /// Restrict to the given codes.
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Record the writer.
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

/// A code that failed without stopping the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeError {
    /// Stock code
    pub code: String,
    /// Failure message
    pub message: String,
}

/// Outcome of a calculation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationSummary {
    /// Factor calculated
    pub factor_name: String,
    /// Codes for which a model was resolved and dates were evaluated
    pub codes_processed: usize,
    /// Values persisted
    pub values_written: usize,
    /// Dates where the calculator produced no value
    pub null_results: usize,
    /// Codes with no applicable model
    pub skipped: Vec<String>,
    /// Codes that failed
    pub errors: Vec<CodeError>,
}

impl CalculationSummary {
    /// Whether every code finished without error.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Observation origin named by a model config, `daily_basic` when absent.
fn model_source(model: &FactorModel) -> Result<DataSource> {
    match model.config.get("source").and_then(|v| v.as_str()) {
        Some(name) => name.parse().map_err(ServiceError::Validation),
        None => Ok(DataSource::DailyBasic),
    }
}

impl FactorService<'_> {
    /// Calculate a factor for every requested code and trading date.
    pub fn calculate(&self, request: &CalculationRequest) -> Result<CalculationSummary> {
        self.calculate_with(request, |_, _, _| {})
    }

    /// Like [`Self::calculate`], invoking `progress(code, done, total)` after
    /// each code.
    pub fn calculate_with<F>(
        &self,
        request: &CalculationRequest,
        mut progress: F,
    ) -> Result<CalculationSummary>
    where
        F: FnMut(&str, usize, usize),
    {
        if request.start > request.end {
            return Err(ServiceError::validation(format!(
                "start date {} is after end date {}",
                request.start, request.end
            )));
        }

        let factor = self.factor(request.factor_id)?;
        let config = self
            .store
            .config(factor.id)?
            .map(|stored| stored.config);
        let fallback = self.store.default_model(factor.id)?;

        let codes = match &request.codes {
            Some(codes) => codes.clone(),
            None => self.codes_in_range(request.start, request.end)?,
        };
        let total = codes.len();

        let mut summary = CalculationSummary {
            factor_name: factor.factor_name.clone(),
            ..Default::default()
        };

        info!(
            factor = %factor.factor_name,
            codes = total,
            start = %request.start,
            end = %request.end,
            "starting calculation"
        );

        if !factor.enabled {
            warn!(factor = %factor.factor_name, "factor is disabled, skipping all codes");
            summary.skipped = codes;
            return Ok(summary);
        }

        let mut calculators: HashMap<ModelId, Box<dyn FactorCalculator>> = HashMap::new();

        for (done, code) in codes.iter().enumerate() {
            let outcome = self
                .resolve_with(factor.id, config.as_ref(), fallback.as_ref(), code)
                .and_then(|resolution| match resolution.model {
                    Some(model) => self
                        .calculate_code(&factor.factor_name, &model, code, request, &mut calculators)
                        .map(Some),
                    None => Ok(None),
                });

            match outcome {
                Ok(Some((written, nulls))) => {
                    summary.codes_processed += 1;
                    summary.values_written += written;
                    summary.null_results += nulls;
                }
                Ok(None) => {
                    debug!(code, "no model applies, skipping");
                    summary.skipped.push(code.clone());
                }
                Err(err) => {
                    warn!(code, error = %err, "calculation failed");
                    summary.errors.push(CodeError {
                        code: code.clone(),
                        message: err.to_string(),
                    });
                }
            }

            progress(code, done + 1, total);
        }

        info!(
            factor = %summary.factor_name,
            processed = summary.codes_processed,
            written = summary.values_written,
            nulls = summary.null_results,
            skipped = summary.skipped.len(),
            errors = summary.errors.len(),
            "calculation finished"
        );
        Ok(summary)
    }

    /// Union of codes with observations in range across every source.
    fn codes_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<String>> {
        let mut codes = BTreeSet::new();
        for source in DataSource::ALL {
            codes.extend(self.store.observation_codes(source, start, end)?);
        }
        Ok(codes.into_iter().collect())
    }

    /// Returns `(values written, null results)` for one code.
    fn calculate_code(
        &self,
        factor_name: &str,
        model: &FactorModel,
        code: &str,
        request: &CalculationRequest,
        calculators: &mut HashMap<ModelId, Box<dyn FactorCalculator>>,
    ) -> Result<(usize, usize)> {
        let calculator = match calculators.entry(model.id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(self.registry.build(factor_name, &model.config)?)
            }
        };

        let source = model_source(model)?;
        let dates = self
            .store
            .trading_dates(source, code, request.start, request.end)?;

        let created_at = Utc::now();
        let mut results = Vec::with_capacity(dates.len());
        let mut nulls = 0;
        for date in dates {
            match calculator.calculate(self.store, code, date) {
                Some(value) => results.push(FactorResult {
                    code: code.to_string(),
                    trade_date: date,
                    factor_name: factor_name.to_string(),
                    value,
                    created_by: request.created_by.clone(),
                    created_at,
                }),
                None => nulls += 1,
            }
        }

        let written = self.store.put_results(&results)?;
        debug!(code, model = %model.id, written, nulls, "calculated code");
        Ok((written, nulls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorhub_data::{NewFactorDefinition, NewFactorModel, SqliteStore};
    use factorhub_factors::{FactorConfig, Mapping, Observation};
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn setup(store: &SqliteStore) -> (i64, ModelId) {
        let service = FactorService::new(store);
        let factor = service
            .create_factor(&NewFactorDefinition {
                factor_name: "turnover_rate".to_string(),
                cn_name: "换手率".to_string(),
                enabled: true,
                ..Default::default()
            })
            .unwrap();
        let model = service
            .create_model(&NewFactorModel {
                factor_id: factor.id,
                model_name: "raw".to_string(),
                model_code: "turnover_rate".to_string(),
                config: json!({"source": "daily_basic", "field": "turnover_rate"}),
                is_default: true,
                enabled: true,
                created_by: None,
            })
            .unwrap();

        store
            .put_observations(
                DataSource::DailyBasic,
                "000001.SZ",
                &[
                    Observation::new("20250106").with("turnover_rate", 1.5),
                    Observation::new("20250107").with("turnover_rate", 2.5),
                    Observation::new("20250108"),
                ],
            )
            .unwrap();
        (factor.id, model.id)
    }

    #[test]
    fn test_calculate_persists_values() {
        let store = SqliteStore::in_memory().unwrap();
        let (factor_id, _) = setup(&store);
        let service = FactorService::new(&store);

        let summary = service
            .calculate(&CalculationRequest::new(factor_id, day(1), day(31)).with_created_by("test"))
            .unwrap();

        assert_eq!(summary.codes_processed, 1);
        assert_eq!(summary.values_written, 2);
        assert_eq!(summary.null_results, 1);
        assert!(summary.is_clean());

        let rows = store
            .results("000001.SZ", Some("turnover_rate"), None, None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].created_by.as_deref(), Some("test"));
    }

    #[test]
    fn test_calculate_rejects_inverted_range() {
        let store = SqliteStore::in_memory().unwrap();
        let (factor_id, _) = setup(&store);
        let service = FactorService::new(&store);

        let err = service
            .calculate(&CalculationRequest::new(factor_id, day(9), day(1)))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_disabled_config_skips_codes() {
        let store = SqliteStore::in_memory().unwrap();
        let (factor_id, model_id) = setup(&store);
        let service = FactorService::new(&store);

        let mut config = FactorConfig::new(vec![Mapping::catch_all(model_id)]);
        config.enabled = false;
        service.create_config(factor_id, &config, None).unwrap();

        let summary = service
            .calculate(&CalculationRequest::new(factor_id, day(1), day(31)))
            .unwrap();
        assert_eq!(summary.skipped, vec!["000001.SZ".to_string()]);
        assert_eq!(summary.values_written, 0);
    }

    #[test]
    fn test_unregistered_factor_reports_code_error() {
        let store = SqliteStore::in_memory().unwrap();
        let service = FactorService::new(&store);
        let factor = service
            .create_factor(&NewFactorDefinition {
                factor_name: "volume_ratio".to_string(),
                cn_name: "量比".to_string(),
                enabled: true,
                ..Default::default()
            })
            .unwrap();
        service
            .create_model(&NewFactorModel {
                factor_id: factor.id,
                model_name: "raw".to_string(),
                model_code: "volume_ratio".to_string(),
                config: json!({}),
                is_default: true,
                enabled: true,
                created_by: None,
            })
            .unwrap();

        let mut seen = Vec::new();
        let summary = service
            .calculate_with(
                &CalculationRequest::new(factor.id, day(1), day(31))
                    .with_codes(["000001.SZ", "000002.SZ"]),
                |code, done, total| seen.push((code.to_string(), done, total)),
            )
            .unwrap();

        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors[0].message.contains("volume_ratio"));
        assert_eq!(seen.last(), Some(&("000002.SZ".to_string(), 2, 2)));
    }
}
