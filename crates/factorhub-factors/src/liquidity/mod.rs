//! Liquidity factors: measures of how actively a stock trades.

pub mod turnover_rate;

pub use turnover_rate::{TurnoverRateCalculator, TurnoverRateConfig};
