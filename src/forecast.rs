//! Recursive multi-day-ahead forecasting
//!
//! One prediction per calendar day, strictly in date order: each day's
//! features are rebuilt from a working series that already contains
//! every earlier prediction, so lag/EMA/rolling features stay live
//! across the horizon. Days whose features cannot be computed fall back
//! to the precomputed fill vector, so the loop never fails to produce a
//! number.

use crate::data::PriceSeries;
use crate::error::Result;
use crate::features::FeatureBuilder;
use crate::models::FittedRegressor;
use crate::split::FillVector;
use chrono::NaiveDate;
use tracing::debug;

/// One forecasted day
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    /// Forecasted calendar day
    pub date: NaiveDate,
    /// Predicted value
    pub pred: f64,
}

/// Sequential day-by-day forecaster
#[derive(Debug, Clone)]
pub struct RecursiveForecaster {
    builder: FeatureBuilder,
}

impl RecursiveForecaster {
    /// Create a forecaster around a feature builder
    pub fn new(builder: FeatureBuilder) -> Self {
        Self { builder }
    }

    /// Forecast every day in `[start, end]` (inclusive), feeding each
    /// prediction back into the working series.
    ///
    /// `feature_columns` fixes the model input order and `fill`
    /// substitutes for any feature the working series cannot define.
    /// Returns an empty sequence when `start > end`. The iteration is
    /// inherently sequential: day d+1 reads day d's prediction.
    pub fn forecast<M: FittedRegressor>(
        &self,
        model: &M,
        base: &PriceSeries,
        start: NaiveDate,
        end: NaiveDate,
        feature_columns: &[String],
        fill: &FillVector,
    ) -> Result<Vec<ForecastPoint>> {
        if start > end {
            return Ok(Vec::new());
        }

        let mut rows: Vec<(NaiveDate, Option<f64>)> =
            base.dates().into_iter().zip(base.values()).collect();
        rows.sort_by_key(|&(date, _)| date);
        let mut dates: Vec<NaiveDate> = rows.iter().map(|&(date, _)| date).collect();
        let mut values: Vec<Option<f64>> = rows.iter().map(|&(_, value)| value).collect();

        let mut points = Vec::new();
        let mut day = start;
        while day <= end {
            // Extend the skeleton when the horizon outruns it
            while dates.last().map(|&last| last < day).unwrap_or(true) {
                let next = match dates.last() {
                    Some(&last) => last.succ_opt().expect("date in supported range"),
                    None => day,
                };
                dates.push(next);
                values.push(None);
            }

            // Lag/EMA/rolling features at this day depend on values the
            // previous iterations wrote, so the table is recomputed.
            let table = self.builder.build_from_parts(&dates, &values)?;

            match dates.binary_search(&day) {
                Ok(i) => {
                    let raw = table.feature_row(i, feature_columns)?;
                    let row: Vec<f64> = raw
                        .iter()
                        .zip(fill.values.iter())
                        .map(|(value, fallback)| value.unwrap_or(*fallback))
                        .collect();
                    let pred = model.predict_one(&row)?;
                    points.push(ForecastPoint { date: day, pred });
                    values[i] = Some(pred);
                }
                Err(pos) => {
                    // Day precedes the series start: no feature row can
                    // exist, so the fill vector stands in wholesale
                    let pred = model.predict_one(&fill.values)?;
                    points.push(ForecastPoint { date: day, pred });
                    dates.insert(pos, day);
                    values.insert(pos, Some(pred));
                }
            }

            day = day.succ_opt().expect("date in supported range");
        }

        debug!(days = points.len(), "recursive forecast complete");
        Ok(points)
    }
}

/// Trailing moving average with a minimum of one observation; used to
/// smooth prediction sequences for reporting, never fed back into the
/// recursion
pub fn smooth_trailing(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let slice = &values[lo..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
