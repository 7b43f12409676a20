//! Calculator Registry
//!
//! Maps factor names to calculator constructors. A constructor turns a
//! model's JSON config into a ready-to-use calculator.

use crate::calculator::FactorCalculator;
use crate::error::{FactorError, Result};
use crate::liquidity::{TurnoverRateCalculator, TurnoverRateConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Builds a calculator from a model config.
pub type Constructor = fn(&Value) -> Result<Box<dyn FactorCalculator>>;

/// Registry of calculator constructors keyed by factor name.
#[derive(Clone, Default)]
pub struct CalculatorRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl fmt::Debug for CalculatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorRegistry")
            .field("factors", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CalculatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in calculator.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("turnover_rate", build_turnover_rate);
        registry
    }

    /// Register or replace the constructor for `name`.
    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Whether a calculator is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered factor names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Build and validate a calculator for `name` from a model config.
    pub fn build(&self, name: &str, config: &Value) -> Result<Box<dyn FactorCalculator>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| FactorError::UnknownCalculator(name.to_string()))?;
        let calculator = constructor(config)?;
        calculator.validate_config()?;
        Ok(calculator)
    }
}

fn build_turnover_rate(config: &Value) -> Result<Box<dyn FactorCalculator>> {
    let config = if config.is_null() {
        TurnoverRateConfig::default()
    } else {
        serde_json::from_value(config.clone())?
    };
    Ok(Box::new(TurnoverRateCalculator::with_config(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelConfigError;
    use serde_json::json;

    #[test]
    fn test_defaults_register_turnover_rate() {
        let registry = CalculatorRegistry::with_defaults();
        assert!(registry.contains("turnover_rate"));
        assert_eq!(registry.names(), vec!["turnover_rate"]);
    }

    #[test]
    fn test_build_from_model_config() {
        let registry = CalculatorRegistry::with_defaults();
        let calculator = registry
            .build(
                "turnover_rate",
                &json!({"source": "daily_basic", "field": "turnover_rate", "method": "ma", "window": 5}),
            )
            .unwrap();
        assert_eq!(calculator.name(), "turnover_rate");
    }

    #[test]
    fn test_build_from_null_config_uses_defaults() {
        let registry = CalculatorRegistry::with_defaults();
        assert!(registry.build("turnover_rate", &Value::Null).is_ok());
    }

    #[test]
    fn test_build_unknown_factor() {
        let registry = CalculatorRegistry::with_defaults();
        let err = registry.build("momentum", &json!({})).unwrap_err();
        assert!(matches!(err, FactorError::UnknownCalculator(name) if name == "momentum"));
    }

    #[test]
    fn test_build_rejects_invalid_model_config() {
        let registry = CalculatorRegistry::with_defaults();
        let err = registry
            .build("turnover_rate", &json!({"method": "ma", "window": 61}))
            .unwrap_err();
        assert!(matches!(
            err,
            FactorError::ModelConfig(ModelConfigError::WindowTooLarge { window: 61, .. })
        ));
    }

    #[test]
    fn test_build_rejects_malformed_json() {
        let registry = CalculatorRegistry::with_defaults();
        let err = registry
            .build("turnover_rate", &json!({"method": 5}))
            .unwrap_err();
        assert!(matches!(err, FactorError::MalformedConfig(_)));
    }

    #[test]
    fn test_build_reports_fractional_window() {
        let registry = CalculatorRegistry::with_defaults();
        let err = registry
            .build("turnover_rate", &json!({"method": "ma", "window": 5.0}))
            .unwrap_err();
        assert!(matches!(
            err,
            FactorError::ModelConfig(ModelConfigError::WindowNotPositive(ref shown)) if shown == "5.0"
        ));
        assert!(err.to_string().contains("must be a positive integer"));
    }
}
