//! Supervised regression models for the forecasting pipeline
//!
//! The pipeline only depends on the [`Regressor`] / [`FittedRegressor`]
//! contract: fit on weighted rows (optionally with a validation set for
//! early stopping), then predict. The concrete gradient-boosted model
//! lives in [`gbt`].

use crate::error::Result;
use crate::split::Dataset;
use std::fmt::Debug;
use tracing::warn;

pub mod gbt;

pub use gbt::{FittedGbt, GbtParams, GradientBoostedTrees};

/// A fitted regression model
pub trait FittedRegressor: Debug {
    /// Predict one value per input row
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Predict a single row
    fn predict_one(&self, row: &[f64]) -> Result<f64> {
        let rows = vec![row.to_vec()];
        self.predict(&rows)?.into_iter().next().ok_or_else(|| {
            crate::error::ForecastError::DataError("Model returned no prediction".to_string())
        })
    }

    /// Name of the model
    fn name(&self) -> &str;
}

/// A regression model that can be fitted on weighted training rows
pub trait Regressor: Debug {
    /// The type of fitted model produced
    type Fitted: FittedRegressor;

    /// Fit the model. `valid` enables early stopping when present; a
    /// fit without it is the documented degraded mode.
    fn fit(&self, train: &Dataset, valid: Option<&Dataset>) -> Result<Self::Fitted>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Capability-selecting factory over candidate parameter sets.
///
/// Candidates are tried in order and the first one that fits wins, so
/// an ambitious configuration can sit in front of a conservative
/// fallback without the pipeline knowing which one was used.
#[derive(Debug, Clone)]
pub struct RegressorFactory {
    candidates: Vec<GbtParams>,
}

impl RegressorFactory {
    /// Create a factory trying the given parameter sets in order
    pub fn new(candidates: Vec<GbtParams>) -> Self {
        Self { candidates }
    }

    /// Create a factory with a single candidate
    pub fn single(params: GbtParams) -> Self {
        Self {
            candidates: vec![params],
        }
    }

    /// Fit the first candidate that succeeds
    pub fn fit(&self, train: &Dataset, valid: Option<&Dataset>) -> Result<FittedGbt> {
        let mut last_error = None;
        for params in &self.candidates {
            let model = GradientBoostedTrees::new(params.clone());
            match model.fit(train, valid) {
                Ok(fitted) => return Ok(fitted),
                Err(err) => {
                    warn!(model = model.name(), %err, "candidate failed to fit, trying next");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            crate::error::ForecastError::InvalidParameter(
                "Regressor factory has no candidates".to_string(),
            )
        }))
    }
}

impl Default for RegressorFactory {
    fn default() -> Self {
        Self::single(GbtParams::default())
    }
}
