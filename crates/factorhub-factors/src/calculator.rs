//! Calculator trait shared by every factor.

use crate::error::ModelConfigError;
use crate::source::ObservationSource;
use chrono::NaiveDate;
use std::fmt::Debug;

/// Computes one factor value for one stock on one date.
///
/// Calculators are best-effort: missing data and source failures yield
/// `None` rather than an error.
pub trait FactorCalculator: Send + Sync + Debug {
    /// Factor name this calculator produces.
    fn name(&self) -> &str;

    /// Check the model parameters this calculator was built with.
    fn validate_config(&self) -> Result<(), ModelConfigError>;

    /// Value for `code` as of `date`, reading from `source`.
    fn calculate(&self, source: &dyn ObservationSource, code: &str, date: NaiveDate)
    -> Option<f64>;
}
