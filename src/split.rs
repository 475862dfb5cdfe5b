//! Chronological splitting, sample reweighting and the fill vector
//!
//! The split is anchored on the last row carrying a defined label, not
//! on a hardcoded calendar date, so it stays correct as new data
//! arrives. Training rows get a weight of 1.0 that configured calendar
//! intervals can only lower.

use crate::config::{DownweightRule, PipelineConfig};
use crate::data::PriceSeries;
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use chrono::{Duration, NaiveDate};
use tracing::warn;

/// Dense, fully defined rows handed to the regressor
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// One feature vector per row, in feature-column order
    pub features: Vec<Vec<f64>>,
    /// Target value per row
    pub targets: Vec<f64>,
    /// Non-negative sample weight per row
    pub weights: Vec<f64>,
    /// Calendar date per row
    pub dates: Vec<NaiveDate>,
}

impl Dataset {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Per-column fallback values substituted for features the recursive
/// forecaster cannot compute; medians over a recent training window
#[derive(Debug, Clone)]
pub struct FillVector {
    /// One value per feature column, in feature-column order
    pub values: Vec<f64>,
}

/// Output of the chronological split
#[derive(Debug, Clone)]
pub struct SplitData {
    /// Rows strictly before the validation window
    pub train: Dataset,
    /// The most recent window of labeled rows
    pub valid: Dataset,
    /// Labeled rows inside the configured test range
    pub test: Dataset,
    /// Full daily skeleton for the recursive forecaster, values unset
    /// beyond the last known date
    pub forecast_base: PriceSeries,
    /// Fallback feature vector for forecast-time substitution
    pub fill: FillVector,
}

/// Assign a sample weight to every date: 1.0 by default, lowered to
/// `min(current, rule weight)` for every rule whose interval contains
/// the date. Applying a rule twice changes nothing.
pub fn apply_downweights(dates: &[NaiveDate], rules: &[DownweightRule]) -> Vec<f64> {
    let mut weights: Vec<f64> = vec![1.0; dates.len()];
    for rule in rules {
        for (weight, &date) in weights.iter_mut().zip(dates.iter()) {
            if rule.contains(date) {
                *weight = (*weight).min(rule.weight);
            }
        }
    }
    weights
}

/// Collect the fully defined labeled rows whose dates satisfy a
/// predicate into a dense dataset with unit weights
pub fn gather_labeled<F>(table: &FeatureTable, keep: F) -> Result<Dataset>
where
    F: Fn(NaiveDate) -> bool,
{
    let dates = table.dates();
    let y = table.y()?;
    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(table.feature_columns().len());
    for name in table.feature_columns() {
        columns.push(table.column(name)?);
    }

    let mut out = Dataset::default();
    for (i, (&date, label)) in dates.iter().zip(y.iter()).enumerate() {
        let label = match label {
            Some(label) => *label,
            None => continue,
        };
        if !keep(date) {
            continue;
        }
        let row: Option<Vec<f64>> = columns.iter().map(|col| col[i]).collect();
        if let Some(row) = row {
            out.features.push(row);
            out.targets.push(label);
            out.weights.push(1.0);
            out.dates.push(date);
        }
    }
    Ok(out)
}

/// Partition a feature table into training, validation and test
/// windows and compute the training-side fill vector.
///
/// Fails with `EmptyTrainingSet` when no fully defined training row
/// survives. An empty validation window is legal and only logged; the
/// caller then fits without early stopping.
pub fn split(table: &FeatureTable, config: &PipelineConfig) -> Result<SplitData> {
    let dates = table.dates();
    let y = table.y()?;
    let feature_columns = table.feature_columns();

    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(feature_columns.len());
    for name in feature_columns {
        columns.push(table.column(name)?);
    }

    let complete = |i: usize| columns.iter().all(|col| col[i].is_some());

    let last_labeled = dates
        .iter()
        .zip(y.iter())
        .filter(|(_, y)| y.is_some())
        .map(|(&date, _)| date)
        .last()
        .ok_or(ForecastError::EmptyTrainingSet)?;
    let cut = last_labeled - Duration::days(config.valid_window_days - 1);

    let mut train_idx = Vec::new();
    let mut valid_idx = Vec::new();
    let mut test_idx = Vec::new();
    for (i, (&date, label)) in dates.iter().zip(y.iter()).enumerate() {
        if label.is_none() || !complete(i) {
            continue;
        }
        if date < cut {
            train_idx.push(i);
        } else if date <= last_labeled {
            valid_idx.push(i);
        }
        if date >= config.test_start && date <= config.eval_end {
            test_idx.push(i);
        }
    }

    if train_idx.is_empty() {
        return Err(ForecastError::EmptyTrainingSet);
    }
    if valid_idx.is_empty() {
        warn!("validation window is empty; model will fit without early stopping");
    }

    let gather = |idx: &[usize]| -> Dataset {
        Dataset {
            features: idx
                .iter()
                .map(|&i| columns.iter().map(|col| col[i].unwrap_or(f64::NAN)).collect())
                .collect(),
            targets: idx.iter().map(|&i| y[i].unwrap_or(f64::NAN)).collect(),
            weights: vec![1.0; idx.len()],
            dates: idx.iter().map(|&i| dates[i]).collect(),
        }
    };

    let mut train = gather(&train_idx);
    train.weights = apply_downweights(&train.dates, &config.downweight);
    let valid = gather(&valid_idx);
    let test = gather(&test_idx);

    let fill = fill_vector(&train, feature_columns, config.fill_recent_days)?;
    let forecast_base = PriceSeries::from_parts(&dates, &y, &config.value_column)?;

    Ok(SplitData {
        train,
        valid,
        test,
        forecast_base,
        fill,
    })
}

/// Per-column medians over training rows whose trend offset falls in
/// the most recent `recent_days` of the training window
fn fill_vector(
    train: &Dataset,
    feature_columns: &[String],
    recent_days: f64,
) -> Result<FillVector> {
    let trend_idx = feature_columns
        .iter()
        .position(|name| name == "trend")
        .ok_or_else(|| ForecastError::MissingColumn {
            column: "trend".to_string(),
        })?;

    let max_trend = train
        .features
        .iter()
        .map(|row| row[trend_idx])
        .fold(f64::NEG_INFINITY, f64::max);
    let threshold = max_trend - recent_days;

    let recent: Vec<&Vec<f64>> = train
        .features
        .iter()
        .filter(|row| row[trend_idx] >= threshold)
        .collect();
    if recent.is_empty() {
        return Err(ForecastError::EmptyTrainingSet);
    }

    let values = (0..feature_columns.len())
        .map(|j| median(recent.iter().map(|row| row[j])))
        .collect();
    Ok(FillVector { values })
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
