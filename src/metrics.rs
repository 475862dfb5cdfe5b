//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};

/// Scalar evaluation metrics for one evaluation window
#[derive(Debug, Clone, PartialEq)]
pub struct EvalMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
}

impl std::fmt::Display for EvalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MAE: {:.1}  RMSE: {:.1}  R^2: {:.3}  SMAPE: {:.2}%",
            self.mae, self.rmse, self.r2, self.smape
        )
    }
}

/// Evaluate predictions against actual values
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<EvalMetrics> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::DataError(
            "Actual and predicted values must have the same non-zero length".to_string(),
        ));
    }

    Ok(EvalMetrics {
        mae: mean_absolute_error(actual, predicted),
        rmse: mean_squared_error(actual, predicted).sqrt(),
        r2: r2_score(actual, predicted),
        smape: smape(actual, predicted),
    })
}

/// Mean absolute error
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().max(1) as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n
}

/// Mean squared error
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().max(1) as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n
}

/// Coefficient of determination. A constant actual series scores 1.0
/// only when reproduced exactly.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().max(1) as f64;
    let mean = actual.iter().sum::<f64>() / n;
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Symmetric mean absolute percentage error in percent; pairs whose
/// absolute values sum to zero are masked out
pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    let terms: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, p)| a.abs() + p.abs() != 0.0)
        .map(|(a, p)| 200.0 * (p - a).abs() / (a.abs() + p.abs()))
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    terms.iter().sum::<f64>() / terms.len() as f64
}
