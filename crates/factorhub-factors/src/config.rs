//! Factor configuration and model resolution.
//!
//! A [`FactorConfig`] is an ordered list of [`Mapping`] rules. Each rule binds
//! a set of stock codes to a computation model; a rule with no codes is the
//! catch-all default. Resolution scans the specific rules first, in stored
//! order, then the default rule, then falls back to the factor's designated
//! default model.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Identifier of a factor computation model.
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    From,
    Into,
)]
#[serde(transparent)]
pub struct ModelId(pub i64);

impl ModelId {
    /// Zero is used by stored configs to mean "no model".
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }
}

/// A rule binding stock codes to a computation model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Model to use for matching codes. Absent or zero means the factor's default model.
    #[serde(default)]
    pub model_id: Option<ModelId>,
    /// Codes covered by this rule. Absent or empty makes this the default rule.
    #[serde(default)]
    pub codes: Option<BTreeSet<String>>,
}

impl Mapping {
    /// Rule for an explicit set of codes.
    pub fn for_codes<I, S>(model_id: impl Into<Option<ModelId>>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model_id: model_id.into(),
            codes: Some(codes.into_iter().map(Into::into).collect()),
        }
    }

    /// Catch-all rule for every code not claimed by a specific rule.
    pub fn catch_all(model_id: impl Into<Option<ModelId>>) -> Self {
        Self {
            model_id: model_id.into(),
            codes: None,
        }
    }

    /// Whether this is the default (catch-all) rule.
    pub fn is_default(&self) -> bool {
        self.codes.as_ref().is_none_or(BTreeSet::is_empty)
    }

    /// Whether this rule explicitly lists `code`.
    pub fn matches(&self, code: &str) -> bool {
        self.codes.as_ref().is_some_and(|codes| codes.contains(code))
    }

    /// The referenced model, treating zero as absent.
    pub fn model(&self) -> Option<ModelId> {
        self.model_id.filter(|id| id.is_set())
    }
}

/// Which rule of a [`FactorConfig`] applies to a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// The factor is switched off for every code.
    Disabled,
    /// A rule listing the code matched.
    Specific {
        /// Position of the rule in the stored order
        index: usize,
        /// The matching rule
        mapping: &'a Mapping,
    },
    /// No specific rule matched; the catch-all rule applies.
    Default {
        /// Position of the rule in the stored order
        index: usize,
        /// The catch-all rule
        mapping: &'a Mapping,
    },
    /// No rule applies; the factor's default model is used.
    Fallback,
}

impl Selection<'_> {
    /// Model chosen by this selection, given the factor's default model.
    pub fn model(&self, fallback: Option<ModelId>) -> Option<ModelId> {
        match self {
            Self::Disabled => None,
            Self::Specific { mapping, .. } | Self::Default { mapping, .. } => {
                mapping.model().or(fallback)
            }
            Self::Fallback => fallback,
        }
    }
}

/// Per-factor mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorConfig {
    /// When false the factor is suppressed for all codes.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Rules in priority order.
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

const fn enabled_by_default() -> bool {
    true
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mappings: Vec::new(),
        }
    }
}

impl FactorConfig {
    /// Enabled config with the given rules.
    pub const fn new(mappings: Vec<Mapping>) -> Self {
        Self {
            enabled: true,
            mappings,
        }
    }

    /// Find the rule that applies to `code`.
    ///
    /// Specific rules win over the catch-all regardless of position; among
    /// overlapping specific rules the first in stored order wins.
    pub fn select(&self, code: &str) -> Selection<'_> {
        if !self.enabled {
            return Selection::Disabled;
        }

        if let Some((index, mapping)) = self
            .mappings
            .iter()
            .enumerate()
            .find(|(_, m)| !m.is_default() && m.matches(code))
        {
            return Selection::Specific { index, mapping };
        }

        self.mappings
            .iter()
            .enumerate()
            .find(|(_, m)| m.is_default())
            .map_or(Selection::Fallback, |(index, mapping)| Selection::Default {
                index,
                mapping,
            })
    }

    /// Resolve the model for `code`, or `None` if the factor is disabled or
    /// nothing (including `fallback`) applies.
    pub fn resolve(&self, code: &str, fallback: Option<ModelId>) -> Option<ModelId> {
        self.select(code).model(fallback)
    }

    /// Number of catch-all rules.
    pub fn default_count(&self) -> usize {
        self.mappings.iter().filter(|m| m.is_default()).count()
    }

    /// Every model id referenced by a rule.
    pub fn referenced_models(&self) -> BTreeSet<ModelId> {
        self.mappings.iter().filter_map(Mapping::model).collect()
    }

    /// Check the config before it is persisted.
    ///
    /// All problems are collected rather than stopping at the first.
    pub fn validate(&self, models: &impl ModelLookup) -> Result<(), ConfigRejection> {
        let mut issues = Vec::new();

        for (index, mapping) in self.mappings.iter().enumerate() {
            match mapping.model() {
                None => issues.push(ConfigIssue::MissingModel { index }),
                Some(model_id) if !models.has_model(model_id) => {
                    issues.push(ConfigIssue::UnknownModel { index, model_id });
                }
                Some(_) => {}
            }
        }

        let defaults = self.default_count();
        if defaults > 1 {
            issues.push(ConfigIssue::MultipleDefaults { count: defaults });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigRejection { issues })
        }
    }
}

/// Lookup used by write-time validation to check model references.
pub trait ModelLookup {
    /// Whether a model with this id exists.
    fn has_model(&self, id: ModelId) -> bool;
}

impl ModelLookup for HashSet<ModelId> {
    fn has_model(&self, id: ModelId) -> bool {
        self.contains(&id)
    }
}

impl ModelLookup for BTreeSet<ModelId> {
    fn has_model(&self, id: ModelId) -> bool {
        self.contains(&id)
    }
}

impl ModelLookup for [ModelId] {
    fn has_model(&self, id: ModelId) -> bool {
        self.contains(&id)
    }
}

/// A single reason a config was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    /// A rule has no model id, or a zero one
    #[error("mapping {index} must specify a model_id")]
    MissingModel {
        /// Rule position
        index: usize,
    },

    /// A rule references a model that does not exist
    #[error("mapping {index} references unknown model {model_id}")]
    UnknownModel {
        /// Rule position
        index: usize,
        /// Missing model
        model_id: ModelId,
    },

    /// More than one catch-all rule
    #[error("only one default mapping (empty codes) is allowed, found {count}")]
    MultipleDefaults {
        /// Number of catch-all rules found
        count: usize,
    },
}

/// All reasons a config was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_issues(.issues))]
pub struct ConfigRejection {
    /// Individual problems, in discovery order
    pub issues: Vec<ConfigIssue>,
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn known(ids: &[i64]) -> HashSet<ModelId> {
        ids.iter().copied().map(ModelId).collect()
    }

    fn override_and_default() -> FactorConfig {
        FactorConfig::new(vec![
            Mapping::for_codes(ModelId(1), ["X"]),
            Mapping::catch_all(ModelId(2)),
        ])
    }

    #[test]
    fn test_specific_mapping_wins() {
        let config = override_and_default();
        assert_eq!(config.resolve("X", None), Some(ModelId(1)));
        assert_eq!(config.resolve("Y", None), Some(ModelId(2)));
    }

    #[test]
    fn test_default_listed_first_still_loses_to_specific() {
        let config = FactorConfig::new(vec![
            Mapping::catch_all(ModelId(2)),
            Mapping::for_codes(ModelId(1), ["X"]),
        ]);
        assert_eq!(config.resolve("X", None), Some(ModelId(1)));
        assert!(matches!(
            config.select("Y"),
            Selection::Default { index: 0, .. }
        ));
    }

    #[test]
    fn test_disabled_resolves_to_nothing() {
        let mut config = override_and_default();
        config.enabled = false;
        assert_eq!(config.resolve("X", Some(ModelId(9))), None);
        assert_eq!(config.resolve("Y", Some(ModelId(9))), None);
        assert_eq!(config.select("X"), Selection::Disabled);
    }

    #[test]
    fn test_overlapping_specific_first_wins() {
        let config = FactorConfig::new(vec![
            Mapping::for_codes(ModelId(3), ["A", "B"]),
            Mapping::for_codes(ModelId(4), ["B", "C"]),
        ]);
        assert_eq!(config.resolve("B", None), Some(ModelId(3)));
        assert_eq!(config.resolve("C", None), Some(ModelId(4)));
    }

    #[test]
    fn test_empty_config_uses_fallback() {
        let config = FactorConfig::default();
        assert_eq!(config.select("X"), Selection::Fallback);
        assert_eq!(config.resolve("X", Some(ModelId(7))), Some(ModelId(7)));
        assert_eq!(config.resolve("X", None), None);
    }

    #[test]
    fn test_no_match_without_default_uses_fallback() {
        let config = FactorConfig::new(vec![Mapping::for_codes(ModelId(1), ["X"])]);
        assert_eq!(config.resolve("Z", Some(ModelId(5))), Some(ModelId(5)));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(ModelId(0)))]
    fn test_missing_model_id_falls_back(#[case] model_id: Option<ModelId>) {
        let config = FactorConfig::new(vec![
            Mapping::for_codes(model_id, ["X"]),
            Mapping::catch_all(model_id),
        ]);
        assert_eq!(config.resolve("X", Some(ModelId(8))), Some(ModelId(8)));
        assert_eq!(config.resolve("Y", Some(ModelId(8))), Some(ModelId(8)));
    }

    #[test]
    fn test_empty_code_list_is_default() {
        let mapping = Mapping::for_codes(ModelId(1), Vec::<String>::new());
        assert!(mapping.is_default());
        assert!(Mapping::catch_all(ModelId(1)).is_default());
        assert!(!Mapping::for_codes(ModelId(1), ["X"]).is_default());
    }

    #[test]
    fn test_validate_accepts_single_default() {
        let config = override_and_default();
        assert!(config.validate(&known(&[1, 2])).is_ok());
    }

    #[test]
    fn test_validate_rejects_two_defaults() {
        let config = FactorConfig::new(vec![
            Mapping::catch_all(ModelId(1)),
            Mapping::for_codes(ModelId(2), Vec::<String>::new()),
        ]);
        let err = config.validate(&known(&[1, 2])).unwrap_err();
        assert_eq!(err.issues, vec![ConfigIssue::MultipleDefaults { count: 2 }]);
        assert!(err.to_string().contains("only one default mapping"));
    }

    #[test]
    fn test_validate_rejects_unknown_model() {
        let config = override_and_default();
        let err = config.validate(&known(&[1])).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ConfigIssue::UnknownModel {
                index: 1,
                model_id: ModelId(2)
            }]
        );
    }

    #[test]
    fn test_validate_collects_every_issue() {
        let config = FactorConfig::new(vec![
            Mapping::catch_all(ModelId(10)),
            Mapping::catch_all(ModelId(1)),
        ]);
        let err = config.validate(&known(&[1])).unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }

    #[test]
    fn test_validate_rejects_absent_or_zero_model() {
        let json = r#"{"mappings": [
            {"codes": ["000001.SZ"]},
            {"model_id": 0, "codes": null}
        ]}"#;
        let config: FactorConfig = serde_json::from_str(json).unwrap();
        let err = config.validate(&known(&[1])).unwrap_err();
        assert_eq!(
            err.issues,
            vec![
                ConfigIssue::MissingModel { index: 0 },
                ConfigIssue::MissingModel { index: 1 },
            ]
        );
        assert!(err.to_string().contains("must specify a model_id"));
    }

    #[test]
    fn test_deserialize_stored_shape() {
        let json = r#"{"enabled": true, "mappings": [
            {"model_id": 1, "codes": null},
            {"model_id": 2, "codes": ["000001.SZ", "000002.SZ"]}
        ]}"#;
        let config: FactorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.resolve("000002.SZ", None), Some(ModelId(2)));
        assert_eq!(config.resolve("600000.SH", None), Some(ModelId(1)));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: FactorConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert!(config.mappings.is_empty());
    }

    #[test]
    fn test_referenced_models_skips_unset() {
        let config = FactorConfig::new(vec![
            Mapping::for_codes(ModelId(3), ["A"]),
            Mapping::catch_all(ModelId(0)),
        ]);
        assert_eq!(config.referenced_models(), BTreeSet::from([ModelId(3)]));
    }
}
