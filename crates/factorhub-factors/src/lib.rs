#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/factorhub/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod calculator;
pub mod config;
pub mod error;
pub mod liquidity;
pub mod registry;
pub mod source;

pub use calculator::FactorCalculator;
pub use config::{ConfigIssue, ConfigRejection, FactorConfig, Mapping, ModelId, ModelLookup, Selection};
pub use error::{FactorError, ModelConfigError, Result, SourceError};
pub use liquidity::{TurnoverRateCalculator, TurnoverRateConfig};
pub use registry::CalculatorRegistry;
pub use source::{DataSource, Observation, ObservationSource, parse_trade_date};
