//! Built-in turnover-rate factor setup.

use crate::error::Result;
use crate::service::FactorService;
use factorhub_data::{FactorModel, NewFactorDefinition, NewFactorModel};
use factorhub_factors::{FactorConfig, Mapping};
use serde_json::json;
use tracing::info;

/// Factor name of the built-in turnover-rate factor.
pub const TURNOVER_RATE: &str = "turnover_rate";

/// Codes mapped to the moving-average model by the example config.
pub const MA_EXAMPLE_CODES: [&str; 2] = ["000001.SZ", "000002.SZ"];

/// Records created by [`FactorService::seed_turnover_rate`].
#[derive(Debug, Clone)]
pub struct SeedReport {
    /// Factor id
    pub factor_id: i64,
    /// Default raw model
    pub default_model: FactorModel,
    /// Moving-average model
    pub ma_model: FactorModel,
}

impl FactorService<'_> {
    /// Create the turnover-rate factor, its raw and moving-average models and
    /// an example config.
    ///
    /// Returns `None` when the factor already exists and `force` is false.
    /// With `force`, the existing factor and everything under it is replaced.
    pub fn seed_turnover_rate(
        &self,
        force: bool,
        created_by: Option<&str>,
    ) -> Result<Option<SeedReport>> {
        if let Some(existing) = self.store.factor_by_name(TURNOVER_RATE)? {
            if !force {
                info!(factor_id = existing.id, "turnover_rate already exists, skipping");
                return Ok(None);
            }
            info!(factor_id = existing.id, "replacing turnover_rate");
            self.delete_factor(existing.id)?;
        }

        let created_by = created_by.map(str::to_string);
        let factor = self.create_factor(&NewFactorDefinition {
            factor_name: TURNOVER_RATE.to_string(),
            cn_name: "换手率".to_string(),
            en_name: Some("Turnover Rate".to_string()),
            column_name: Some(TURNOVER_RATE.to_string()),
            description: Some("Share turnover; how actively a stock trades".to_string()),
            enabled: true,
            created_by: created_by.clone(),
        })?;

        let default_model = self.create_model(&NewFactorModel {
            factor_id: factor.id,
            model_name: "Turnover rate (daily basic)".to_string(),
            model_code: "turnover_rate".to_string(),
            config: json!({"source": "daily_basic", "field": "turnover_rate"}),
            is_default: true,
            enabled: true,
            created_by: created_by.clone(),
        })?;

        let ma_model = self.create_model(&NewFactorModel {
            factor_id: factor.id,
            model_name: "Turnover rate (moving average)".to_string(),
            model_code: "turnover_rate_ma".to_string(),
            config: json!({
                "source": "daily_basic",
                "field": "turnover_rate",
                "method": "ma",
                "window": 5
            }),
            is_default: false,
            enabled: true,
            created_by: created_by.clone(),
        })?;

        let config = FactorConfig::new(vec![
            Mapping::catch_all(default_model.id),
            Mapping::for_codes(ma_model.id, MA_EXAMPLE_CODES),
        ]);
        self.create_config(factor.id, &config, created_by.as_deref())?;

        info!(
            factor_id = factor.id,
            default_model = %default_model.id,
            ma_model = %ma_model.id,
            "seeded turnover_rate"
        );
        Ok(Some(SeedReport {
            factor_id: factor.id,
            default_model,
            ma_model,
        }))
    }
}
