//! Leakage-safe feature construction
//!
//! Turns a canonical daily price series into one feature row per
//! calendar day. Calendar, cyclical and trend columns may read the
//! row's own date; every column derived from the value series reads a
//! series that was forward-filled and then shifted by at least one day,
//! so the value *at* a date never feeds a predictor feature *for* that
//! date.

use crate::config::FeatureConfig;
use crate::data::{date_to_millis, millis_to_date, PriceSeries};
use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::f64::consts::PI;

/// Days in the annual cycle used for the yearly sine/cosine encoding
const ANNUAL_PERIOD: f64 = 365.25;
/// Days in the monthly cycle used for the monthly sine/cosine encoding
const MONTHLY_PERIOD: f64 = 31.0;
/// Divisor keeping the squared trend numerically small
const TREND_SCALE: f64 = 1e6;
/// Lag distances used for the year-over-year columns
const YOY_LAGS: [usize; 3] = [364, 365, 366];
/// Shift distance of the year-over-year reference value
const YOY_SHIFT: usize = 366;

/// Feature table: one row per calendar day of the input series
///
/// All feature columns are nullable Float64; a null marks a feature the
/// available history cannot define yet. Rows are never dropped here.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    df: DataFrame,
    feature_columns: Vec<String>,
}

impl FeatureTable {
    /// Get the backing DataFrame
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Names of the predictor columns, in model input order
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Get the dates as a vector
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.df
            .column("date")
            .and_then(|col| col.i64().map(|ca| ca.into_iter().collect::<Vec<_>>()))
            .map(|ms| ms.into_iter().flatten().filter_map(millis_to_date).collect())
            .unwrap_or_default()
    }

    /// Get one column as nullable values
    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let col = self
            .df
            .column(name)
            .map_err(|_| ForecastError::MissingColumn {
                column: name.to_string(),
            })?;
        Ok(col.f64()?.into_iter().collect())
    }

    /// Get the target column
    pub fn y(&self) -> Result<Vec<Option<f64>>> {
        self.column("y")
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.df.height()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Row index of a calendar date, if the table has one
    pub fn index_of_date(&self, date: NaiveDate) -> Option<usize> {
        self.dates().binary_search(&date).ok()
    }

    /// Extract one row restricted to the given columns, in their order
    pub fn feature_row(&self, index: usize, columns: &[String]) -> Result<Vec<Option<f64>>> {
        if index >= self.len() {
            return Err(ForecastError::DataError(format!(
                "Row index {} out of bounds ({} rows)",
                index,
                self.len()
            )));
        }
        let mut row = Vec::with_capacity(columns.len());
        for name in columns {
            let col = self
                .df
                .column(name)
                .map_err(|_| ForecastError::MissingColumn {
                    column: name.to_string(),
                })?;
            row.push(col.f64()?.get(index));
        }
        Ok(row)
    }
}

/// Builds the feature table for a commodity series
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    /// Create a builder with the given feature parameters
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Build the feature table for a canonical price series.
    ///
    /// The input is not mutated; rows are re-sorted defensively and the
    /// output keeps exactly one row per input date. Fails with
    /// `MissingColumn` when the series lacks its value column.
    pub fn build(&self, series: &PriceSeries) -> Result<FeatureTable> {
        if series.dataframe().column(series.value_column()).is_err() {
            return Err(ForecastError::MissingColumn {
                column: series.value_column().to_string(),
            });
        }

        let mut rows: Vec<(NaiveDate, Option<f64>)> = series
            .dates()
            .into_iter()
            .zip(series.values())
            .collect();
        rows.sort_by_key(|&(date, _)| date);

        let dates: Vec<NaiveDate> = rows.iter().map(|&(date, _)| date).collect();
        let values: Vec<Option<f64>> = rows.iter().map(|&(_, value)| value).collect();
        self.build_from_parts(&dates, &values)
    }

    /// Build the feature table from parallel date/value vectors that
    /// are already sorted ascending by date
    pub fn build_from_parts(
        &self,
        dates: &[NaiveDate],
        values: &[Option<f64>],
    ) -> Result<FeatureTable> {
        if dates.len() != values.len() {
            return Err(ForecastError::DataError(format!(
                "Date count ({}) doesn't match value count ({})",
                dates.len(),
                values.len()
            )));
        }
        let n = dates.len();

        // Sparse dates are stabilized by carrying the last known value
        // forward; only past values ever flow into a later row.
        let filled = forward_fill(values);
        let shifted = shift(&filled, 1);

        let mut columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();

        // Calendar and seasonality
        let base = dates.first().copied();
        let (hstart, hend) = self.config.harvest_months;
        columns.push(("year".into(), dates.iter().map(|d| some(d.year() as f64)).collect()));
        columns.push(("month".into(), dates.iter().map(|d| some(d.month() as f64)).collect()));
        columns.push(("day".into(), dates.iter().map(|d| some(d.day() as f64)).collect()));
        columns.push((
            "dow".into(),
            dates
                .iter()
                .map(|d| some(d.weekday().num_days_from_monday() as f64))
                .collect(),
        ));
        columns.push((
            "doy".into(),
            dates.iter().map(|d| some(d.ordinal() as f64)).collect(),
        ));
        columns.push((
            "week".into(),
            dates
                .iter()
                .map(|d| some(d.iso_week().week() as f64))
                .collect(),
        ));
        columns.push((
            "quarter".into(),
            dates
                .iter()
                .map(|d| some(((d.month() - 1) / 3 + 1) as f64))
                .collect(),
        ));
        columns.push((
            "is_harvest".into(),
            dates
                .iter()
                .map(|d| some(if d.month() >= hstart && d.month() <= hend { 1.0 } else { 0.0 }))
                .collect(),
        ));

        // Annual and monthly cycles
        columns.push((
            "sin_year".into(),
            dates
                .iter()
                .map(|d| some((2.0 * PI * d.ordinal() as f64 / ANNUAL_PERIOD).sin()))
                .collect(),
        ));
        columns.push((
            "cos_year".into(),
            dates
                .iter()
                .map(|d| some((2.0 * PI * d.ordinal() as f64 / ANNUAL_PERIOD).cos()))
                .collect(),
        ));
        columns.push((
            "sin_month".into(),
            dates
                .iter()
                .map(|d| some((2.0 * PI * d.day() as f64 / MONTHLY_PERIOD).sin()))
                .collect(),
        ));
        columns.push((
            "cos_month".into(),
            dates
                .iter()
                .map(|d| some((2.0 * PI * d.day() as f64 / MONTHLY_PERIOD).cos()))
                .collect(),
        ));

        // Trend
        let trend: Vec<Option<f64>> = dates
            .iter()
            .map(|d| base.map(|b| (*d - b).num_days() as f64))
            .collect();
        let trend2: Vec<Option<f64>> = trend
            .iter()
            .map(|t| t.map(|t| t * t / TREND_SCALE))
            .collect();
        columns.push(("trend".into(), trend));
        columns.push(("trend2".into(), trend2));

        // Lags
        for &lag in &self.config.lags {
            columns.push((format!("lag_{}", lag), shift(&filled, lag as usize)));
        }

        // Exponentially weighted means of the once-shifted series
        for &span in &self.config.ema_spans {
            columns.push((format!("ema_{}", span), ewm_mean(&shifted, span)));
        }

        // Rolling statistics of the once-shifted series
        for &window in &self.config.rolling_windows {
            columns.push((
                format!("rmean_{}", window),
                rolling_mean(&shifted, window as usize),
            ));
            columns.push((
                format!("rstd_{}", window),
                rolling_std(&shifted, window as usize),
            ));
        }

        // Differences and relative changes, all on the shifted series
        let shift2 = shift(&filled, 2);
        let shift8 = shift(&filled, 8);
        columns.push(("diff_1".into(), sub(&shifted, &shift2)));
        columns.push(("diff_7".into(), sub(&shifted, &shift8)));
        columns.push(("ret_1".into(), rel_change(&shifted, &shift2)));
        columns.push(("ret_7".into(), rel_change(&shifted, &shift8)));

        // Optional year-over-year block; toggling it must leave every
        // other column untouched
        if self.config.use_yoy {
            for &lag in &YOY_LAGS {
                columns.push((format!("lag_{}", lag), shift(&filled, lag)));
            }
            let yoy = shift(&filled, YOY_SHIFT);
            columns.push(("yoy_diff".into(), sub(&shifted, &yoy)));
            columns.push(("yoy_ratio".into(), rel_change(&shifted, &yoy)));
        }

        let feature_columns: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();

        let mut series_vec = Vec::with_capacity(columns.len() + 2);
        series_vec.push(Series::new(
            "date",
            dates.iter().map(|&d| date_to_millis(d)).collect::<Vec<i64>>(),
        ));
        series_vec.push(Series::new("y", values.to_vec()));
        for (name, column) in columns {
            debug_assert_eq!(column.len(), n);
            series_vec.push(Series::new(&name, column));
        }

        let df = DataFrame::new(series_vec)?;
        Ok(FeatureTable {
            df,
            feature_columns,
        })
    }
}

fn some(value: f64) -> Option<f64> {
    Some(value)
}

/// Carry the last defined value forward over unset entries
fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last = None;
    values
        .iter()
        .map(|value| {
            if value.is_some() {
                last = *value;
            }
            last
        })
        .collect()
}

/// Shift a series forward by `by` rows, unset at the head
fn shift(values: &[Option<f64>], by: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len().min(by)];
    if values.len() > by {
        out.extend_from_slice(&values[..values.len() - by]);
    }
    out
}

/// Exponentially weighted mean with the span convention
/// (alpha = 2 / (span + 1)); the first defined observation seeds the
/// mean exactly, unset entries carry the current mean
fn ewm_mean(values: &[Option<f64>], span: u32) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut level: Option<f64> = None;
    values
        .iter()
        .map(|value| {
            if let Some(x) = value {
                level = Some(match level {
                    Some(l) => alpha * x + (1.0 - alpha) * l,
                    None => *x,
                });
            }
            level
        })
        .collect()
}

/// Rolling mean over the trailing `window` rows, defined from the first
/// in-window observation onward
fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let obs: Vec<f64> = values[lo..=i].iter().flatten().copied().collect();
            if obs.is_empty() {
                None
            } else {
                Some(obs.iter().sum::<f64>() / obs.len() as f64)
            }
        })
        .collect()
}

/// Rolling sample standard deviation over the trailing `window` rows;
/// needs at least two in-window observations
fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let obs: Vec<f64> = values[lo..=i].iter().flatten().copied().collect();
            if obs.len() < 2 {
                return None;
            }
            let mean = obs.iter().sum::<f64>() / obs.len() as f64;
            let var = obs.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                / (obs.len() - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

/// Elementwise `a - b`, unset when either side is unset
fn sub(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b.iter())
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        })
        .collect()
}

/// Elementwise `a / b - 1`, unset when either side is unset or the
/// ratio is not finite
fn rel_change(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b.iter())
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => {
                let r = a / b - 1.0;
                r.is_finite().then_some(r)
            }
            _ => None,
        })
        .collect()
}
