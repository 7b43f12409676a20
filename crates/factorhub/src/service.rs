//! Factor Service
//!
//! Definitions, models and mapping configs, with write-time validation and
//! model resolution for a stock code.

use crate::error::{Result, ServiceError};
use chrono::NaiveDate;
use derive_more::Display;
use factorhub_data::{
    DataError, FactorDefinition, FactorDefinitionUpdate, FactorModel, FactorModelUpdate,
    FactorQuery, NewFactorDefinition, NewFactorModel, SqliteStore, StoredFactorConfig,
};
use factorhub_factors::{CalculatorRegistry, FactorConfig, ModelId, Selection};
use polars::prelude::DataFrame;
use serde_json::Value;
use tracing::{debug, info};

/// Which rule decided the model for a code.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The factor has no stored config; its default model applies
    #[display("no config, factor default model")]
    Unconfigured,
    /// The config is disabled; no model applies
    #[display("config disabled")]
    Disabled,
    /// A mapping listing the code matched
    #[display("specific mapping #{index}")]
    Specific {
        /// Position of the mapping
        index: usize,
    },
    /// The catch-all mapping applied
    #[display("default mapping #{index}")]
    Default {
        /// Position of the mapping
        index: usize,
    },
    /// No mapping applied; the factor's default model is used
    #[display("factor default model")]
    Fallback,
}

impl From<Selection<'_>> for MatchKind {
    fn from(selection: Selection<'_>) -> Self {
        match selection {
            Selection::Disabled => Self::Disabled,
            Selection::Specific { index, .. } => Self::Specific { index },
            Selection::Default { index, .. } => Self::Default { index },
            Selection::Fallback => Self::Fallback,
        }
    }
}

/// Outcome of resolving a factor's model for one code.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Factor resolved
    pub factor_id: i64,
    /// Stock code resolved
    pub code: String,
    /// Rule that decided
    pub matched: MatchKind,
    /// Chosen model, if any
    pub model: Option<FactorModel>,
}

/// Factor management service over a [`SqliteStore`].
#[derive(Debug)]
pub struct FactorService<'a> {
    pub(crate) store: &'a SqliteStore,
    pub(crate) registry: CalculatorRegistry,
}

impl<'a> FactorService<'a> {
    /// Service with the built-in calculators.
    pub fn new(store: &'a SqliteStore) -> Self {
        Self::with_registry(store, CalculatorRegistry::with_defaults())
    }

    /// Service with a custom calculator registry.
    pub const fn with_registry(store: &'a SqliteStore, registry: CalculatorRegistry) -> Self {
        Self { store, registry }
    }

    /// Underlying store.
    pub const fn store(&self) -> &'a SqliteStore {
        self.store
    }

    /// Calculator registry.
    pub const fn registry(&self) -> &CalculatorRegistry {
        &self.registry
    }

    // ==================== Factor definitions ====================

    /// Create a factor definition.
    pub fn create_factor(&self, new: &NewFactorDefinition) -> Result<FactorDefinition> {
        if new.factor_name.trim().is_empty() {
            return Err(ServiceError::validation("factor_name must not be empty"));
        }
        if new.cn_name.trim().is_empty() {
            return Err(ServiceError::validation("cn_name must not be empty"));
        }
        Ok(self.store.insert_factor(new)?)
    }

    /// Factor by id.
    pub fn factor(&self, id: i64) -> Result<FactorDefinition> {
        Ok(self.store.require_factor(id)?)
    }

    /// Factor by name.
    pub fn factor_by_name(&self, factor_name: &str) -> Result<FactorDefinition> {
        self.store
            .factor_by_name(factor_name)?
            .ok_or_else(|| DataError::not_found("factor", factor_name).into())
    }

    /// List factors.
    pub fn list_factors(&self, query: &FactorQuery) -> Result<Vec<FactorDefinition>> {
        Ok(self.store.list_factors(query)?)
    }

    /// Partially update a factor.
    pub fn update_factor(&self, id: i64, update: &FactorDefinitionUpdate) -> Result<FactorDefinition> {
        if update
            .column_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(ServiceError::validation("column_name must not be empty"));
        }
        Ok(self.store.update_factor(id, update)?)
    }

    /// Delete a factor with its models and config.
    pub fn delete_factor(&self, id: i64) -> Result<()> {
        Ok(self.store.delete_factor(id)?)
    }

    // ==================== Factor models ====================

    /// Create a model; its config must build a valid calculator when one is
    /// registered for the factor.
    pub fn create_model(&self, new: &NewFactorModel) -> Result<FactorModel> {
        let factor = self.factor(new.factor_id)?;
        self.check_model_config(&factor, &new.config)?;
        Ok(self.store.insert_model(new)?)
    }

    /// Model by id.
    pub fn model(&self, id: ModelId) -> Result<FactorModel> {
        Ok(self.store.require_model(id)?)
    }

    /// Models, optionally of one factor.
    pub fn list_models(&self, factor_id: Option<i64>) -> Result<Vec<FactorModel>> {
        Ok(self.store.list_models(factor_id)?)
    }

    /// Partially update a model.
    pub fn update_model(&self, id: ModelId, update: &FactorModelUpdate) -> Result<FactorModel> {
        if let Some(config) = &update.config {
            let model = self.model(id)?;
            let factor = self.factor(model.factor_id)?;
            self.check_model_config(&factor, config)?;
        }
        Ok(self.store.update_model(id, update)?)
    }

    /// Make a model its factor's default, clearing the flag on the others.
    pub fn set_default_model(&self, id: ModelId) -> Result<FactorModel> {
        self.update_model(
            id,
            &FactorModelUpdate {
                is_default: Some(true),
                ..Default::default()
            },
        )
    }

    /// Delete a model.
    pub fn delete_model(&self, id: ModelId) -> Result<()> {
        Ok(self.store.delete_model(id)?)
    }

    /// The factor's designated default model (default and enabled).
    pub fn default_model(&self, factor_id: i64) -> Result<Option<FactorModel>> {
        self.factor(factor_id)?;
        Ok(self.store.default_model(factor_id)?)
    }

    fn check_model_config(&self, factor: &FactorDefinition, config: &Value) -> Result<()> {
        if !config.is_object() {
            return Err(ServiceError::validation("model config must be a JSON object"));
        }
        if self.registry.contains(&factor.factor_name) {
            self.registry.build(&factor.factor_name, config)?;
        }
        Ok(())
    }

    // ==================== Factor configs ====================

    /// Check a config against the stored models without writing anything.
    pub fn validate_config(&self, config: &FactorConfig) -> Result<()> {
        let models = self.store.model_ids()?;
        config.validate(&models)?;
        Ok(())
    }

    /// Create the mapping config of a factor.
    ///
    /// Rejected before any write if the factor is missing, already has a
    /// config, or the config fails validation.
    pub fn create_config(
        &self,
        factor_id: i64,
        config: &FactorConfig,
        created_by: Option<&str>,
    ) -> Result<StoredFactorConfig> {
        self.factor(factor_id)?;
        if self.store.config(factor_id)?.is_some() {
            return Err(DataError::duplicate("factor config", factor_id).into());
        }
        self.validate_config(config)?;
        Ok(self.store.insert_config(factor_id, config, created_by)?)
    }

    /// Mapping config of a factor.
    pub fn config(&self, factor_id: i64) -> Result<StoredFactorConfig> {
        Ok(self.store.require_config(factor_id)?)
    }

    /// Replace the mapping config of a factor, validating first.
    pub fn update_config(
        &self,
        factor_id: i64,
        config: &FactorConfig,
        updated_by: Option<&str>,
    ) -> Result<StoredFactorConfig> {
        self.store.require_config(factor_id)?;
        self.validate_config(config)?;
        Ok(self.store.update_config(factor_id, config, updated_by)?)
    }

    /// Create or replace the mapping config of a factor.
    pub fn put_config(
        &self,
        factor_id: i64,
        config: &FactorConfig,
        user: Option<&str>,
    ) -> Result<StoredFactorConfig> {
        if self.store.config(factor_id)?.is_some() {
            self.update_config(factor_id, config, user)
        } else {
            self.create_config(factor_id, config, user)
        }
    }

    /// Delete the mapping config of a factor.
    pub fn delete_config(&self, factor_id: i64) -> Result<()> {
        Ok(self.store.delete_config(factor_id)?)
    }

    // ==================== Resolution ====================

    /// Resolve the model for `code` and report which rule decided.
    pub fn resolve(&self, factor_id: i64, code: &str) -> Result<Resolution> {
        self.factor(factor_id)?;
        let config = self.store.config(factor_id)?.map(|stored| stored.config);
        let fallback = self.store.default_model(factor_id)?;
        self.resolve_with(factor_id, config.as_ref(), fallback.as_ref(), code)
    }

    /// Model to use for `code`, or `None` when the config is disabled or no
    /// model applies.
    pub fn model_for_code(&self, factor_id: i64, code: &str) -> Result<Option<FactorModel>> {
        Ok(self.resolve(factor_id, code)?.model)
    }

    pub(crate) fn resolve_with(
        &self,
        factor_id: i64,
        config: Option<&FactorConfig>,
        fallback: Option<&FactorModel>,
        code: &str,
    ) -> Result<Resolution> {
        let fallback_id = fallback.map(|model| model.id);

        let (matched, model_id) = match config {
            Some(config) => {
                let selection = config.select(code);
                (MatchKind::from(selection), selection.model(fallback_id))
            }
            None => (MatchKind::Unconfigured, fallback_id),
        };

        let model = match model_id {
            Some(id) if Some(id) == fallback_id => fallback.cloned(),
            Some(id) => Some(self.model(id)?),
            None => None,
        };
        debug!(factor_id, code, %matched, model = ?model.as_ref().map(|m| m.id), "resolved model");

        Ok(Resolution {
            factor_id,
            code: code.to_string(),
            matched,
            model,
        })
    }

    // ==================== Results ====================

    /// Stored values for `code`, one row per trade date (newest first) and
    /// one column per factor.
    ///
    /// With `factor_name`, the factor must exist and only its column is
    /// returned.
    pub fn results(
        &self,
        code: &str,
        factor_name: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DataFrame> {
        if let Some(name) = factor_name {
            self.factor_by_name(name)?;
        }
        let df = self.store.results_frame(code, factor_name, start, end)?;
        info!(code, rows = df.height(), "queried factor results");
        Ok(df)
    }
}
