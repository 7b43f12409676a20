//! Persisted record types and their create/update payloads.

use chrono::{DateTime, NaiveDate, Utc};
use factorhub_factors::{FactorConfig, ModelId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDefinition {
    /// Row id
    pub id: i64,
    /// Unique machine name, also the calculator key
    pub factor_name: String,
    /// Chinese display name
    pub cn_name: String,
    /// English display name
    pub en_name: Option<String>,
    /// Column name used in result frames
    pub column_name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Whether the factor is active
    pub enabled: bool,
    /// Creator
    pub created_by: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last editor
    pub updated_by: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a factor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFactorDefinition {
    /// Unique machine name
    pub factor_name: String,
    /// Chinese display name
    pub cn_name: String,
    /// English display name
    pub en_name: Option<String>,
    /// Result column name; defaults to `factor_name`
    pub column_name: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Whether the factor starts active
    pub enabled: bool,
    /// Creator
    pub created_by: Option<String>,
}

/// Partial update of a factor; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorDefinitionUpdate {
    /// New Chinese display name
    pub cn_name: Option<String>,
    /// New English display name
    pub en_name: Option<String>,
    /// New result column name
    pub column_name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New active flag
    pub enabled: Option<bool>,
    /// Editor
    pub updated_by: Option<String>,
}

impl FactorDefinitionUpdate {
    pub(crate) fn apply(&self, factor: &mut FactorDefinition) {
        if let Some(cn_name) = &self.cn_name {
            factor.cn_name.clone_from(cn_name);
        }
        if let Some(en_name) = &self.en_name {
            factor.en_name = Some(en_name.clone());
        }
        if let Some(column_name) = &self.column_name {
            factor.column_name.clone_from(column_name);
        }
        if let Some(description) = &self.description {
            factor.description = Some(description.clone());
        }
        if let Some(enabled) = self.enabled {
            factor.enabled = enabled;
        }
        if self.updated_by.is_some() {
            factor.updated_by.clone_from(&self.updated_by);
        }
    }
}

/// A computation model of a factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorModel {
    /// Row id
    pub id: ModelId,
    /// Owning factor
    pub factor_id: i64,
    /// Display name
    pub model_name: String,
    /// Short code
    pub model_code: String,
    /// Calculator parameters
    pub config: Value,
    /// Whether this is the factor's designated default model
    pub is_default: bool,
    /// Whether the model is active
    pub enabled: bool,
    /// Creator
    pub created_by: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last editor
    pub updated_by: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFactorModel {
    /// Owning factor
    pub factor_id: i64,
    /// Display name
    pub model_name: String,
    /// Short code
    pub model_code: String,
    /// Calculator parameters
    pub config: Value,
    /// Mark as the factor's default model
    pub is_default: bool,
    /// Whether the model starts active
    pub enabled: bool,
    /// Creator
    pub created_by: Option<String>,
}

/// Partial update of a model; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorModelUpdate {
    /// New display name
    pub model_name: Option<String>,
    /// New short code
    pub model_code: Option<String>,
    /// New calculator parameters
    pub config: Option<Value>,
    /// New default flag
    pub is_default: Option<bool>,
    /// New active flag
    pub enabled: Option<bool>,
    /// Editor
    pub updated_by: Option<String>,
}

impl FactorModelUpdate {
    pub(crate) fn apply(&self, model: &mut FactorModel) {
        if let Some(model_name) = &self.model_name {
            model.model_name.clone_from(model_name);
        }
        if let Some(model_code) = &self.model_code {
            model.model_code.clone_from(model_code);
        }
        if let Some(config) = &self.config {
            model.config = config.clone();
        }
        if let Some(is_default) = self.is_default {
            model.is_default = is_default;
        }
        if let Some(enabled) = self.enabled {
            model.enabled = enabled;
        }
        if self.updated_by.is_some() {
            model.updated_by.clone_from(&self.updated_by);
        }
    }
}

/// Mapping config persisted for one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFactorConfig {
    /// Owning factor (one config per factor)
    pub factor_id: i64,
    /// Mapping rules
    pub config: FactorConfig,
    /// Creator
    pub created_by: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last editor
    pub updated_by: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// One calculated factor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorResult {
    /// Stock code
    pub code: String,
    /// Date the value applies to
    pub trade_date: NaiveDate,
    /// Factor machine name
    pub factor_name: String,
    /// Calculated value
    pub value: f64,
    /// Who triggered the calculation
    pub created_by: Option<String>,
    /// When the value was written
    pub created_at: DateTime<Utc>,
}

/// A user's holding in one stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Row id
    pub id: i64,
    /// Owner
    pub user_id: i64,
    /// Stock code
    pub code: String,
    /// Shares held
    pub quantity: f64,
    /// Average cost per share
    pub avg_cost: f64,
    /// Purchase date
    pub buy_date: Option<NaiveDate>,
    /// Latest price
    pub current_price: Option<f64>,
    /// Note
    pub comment: Option<String>,
    /// Creator
    pub created_by: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last editor
    pub updated_by: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// `quantity * avg_cost`.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    /// `quantity * current_price`, absent without a price.
    pub fn market_value(&self) -> Option<f64> {
        self.current_price.map(|price| self.quantity * price)
    }

    /// Market value minus cost basis.
    pub fn profit(&self) -> Option<f64> {
        self.market_value().map(|value| value - self.cost_basis())
    }

    /// Profit as a percentage of cost basis, absent when the basis is zero.
    pub fn profit_pct(&self) -> Option<f64> {
        let basis = self.cost_basis();
        if basis == 0.0 {
            return None;
        }
        self.profit().map(|profit| profit / basis * 100.0)
    }
}

/// Payload for opening a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    /// Owner
    pub user_id: i64,
    /// Stock code
    pub code: String,
    /// Shares held
    pub quantity: f64,
    /// Average cost per share
    pub avg_cost: f64,
    /// Purchase date
    pub buy_date: Option<NaiveDate>,
    /// Latest price
    pub current_price: Option<f64>,
    /// Note
    pub comment: Option<String>,
    /// Creator
    pub created_by: Option<String>,
}

/// Partial update of a position; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// New share count
    pub quantity: Option<f64>,
    /// New average cost
    pub avg_cost: Option<f64>,
    /// New purchase date
    pub buy_date: Option<NaiveDate>,
    /// New latest price
    pub current_price: Option<f64>,
    /// New note
    pub comment: Option<String>,
    /// Editor
    pub updated_by: Option<String>,
}

impl PositionUpdate {
    pub(crate) fn apply(&self, position: &mut Position) {
        if let Some(quantity) = self.quantity {
            position.quantity = quantity;
        }
        if let Some(avg_cost) = self.avg_cost {
            position.avg_cost = avg_cost;
        }
        if self.buy_date.is_some() {
            position.buy_date = self.buy_date;
        }
        if self.current_price.is_some() {
            position.current_price = self.current_price;
        }
        if let Some(comment) = &self.comment {
            position.comment = Some(comment.clone());
        }
        if self.updated_by.is_some() {
            position.updated_by.clone_from(&self.updated_by);
        }
    }
}

/// A stock on a user's watch list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    /// Row id
    pub id: i64,
    /// Owner
    pub user_id: i64,
    /// Stock code
    pub code: String,
    /// Note
    pub comment: Option<String>,
    /// When the stock was added
    pub fav_datetime: DateTime<Utc>,
    /// Creator
    pub created_by: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last editor
    pub updated_by: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Payload for adding a favorite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFavorite {
    /// Owner
    pub user_id: i64,
    /// Stock code
    pub code: String,
    /// Note
    pub comment: Option<String>,
    /// When the stock was added; defaults to now
    pub fav_datetime: Option<DateTime<Utc>>,
    /// Creator
    pub created_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn position(quantity: f64, avg_cost: f64, current_price: Option<f64>) -> Position {
        Position {
            id: 1,
            user_id: 1,
            code: "000001.SZ".to_string(),
            quantity,
            avg_cost,
            buy_date: None,
            current_price,
            comment: None,
            created_by: None,
            created_at: Utc::now(),
            updated_by: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_position_derived_values() {
        let p = position(1000.0, 10.0, Some(12.5));
        assert_relative_eq!(p.market_value().unwrap(), 12_500.0);
        assert_relative_eq!(p.profit().unwrap(), 2_500.0);
        assert_relative_eq!(p.profit_pct().unwrap(), 25.0);
    }

    #[test]
    fn test_position_loss() {
        let p = position(200.0, 50.0, Some(40.0));
        assert_relative_eq!(p.profit().unwrap(), -2_000.0);
        assert_relative_eq!(p.profit_pct().unwrap(), -20.0);
    }

    #[test]
    fn test_position_without_price() {
        let p = position(1000.0, 10.0, None);
        assert_eq!(p.market_value(), None);
        assert_eq!(p.profit(), None);
        assert_eq!(p.profit_pct(), None);
    }

    #[test]
    fn test_position_zero_cost_basis() {
        let p = position(100.0, 0.0, Some(5.0));
        assert_relative_eq!(p.profit().unwrap(), 500.0);
        assert_eq!(p.profit_pct(), None);
    }

    #[test]
    fn test_factor_update_is_partial() {
        let now = Utc::now();
        let mut factor = FactorDefinition {
            id: 1,
            factor_name: "turnover_rate".to_string(),
            cn_name: "换手率".to_string(),
            en_name: Some("Turnover Rate".to_string()),
            column_name: "turnover_rate".to_string(),
            description: None,
            enabled: true,
            created_by: None,
            created_at: now,
            updated_by: None,
            updated_at: now,
        };
        FactorDefinitionUpdate {
            enabled: Some(false),
            description: Some("activity".to_string()),
            ..Default::default()
        }
        .apply(&mut factor);

        assert!(!factor.enabled);
        assert_eq!(factor.description.as_deref(), Some("activity"));
        assert_eq!(factor.en_name.as_deref(), Some("Turnover Rate"));
    }
}
