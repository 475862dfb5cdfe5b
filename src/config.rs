//! Pipeline configuration
//!
//! Every knob that varies between commodities (data columns, date
//! boundaries, feature toggles, downweight calendar) lives in an
//! immutable [`PipelineConfig`] passed into each component, so one core
//! can run several commodities or synthetic test ranges in one process.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A calendar interval whose training rows are downweighted.
///
/// Rules compose by taking the minimum: overlapping rules can only
/// lower a row's weight, never raise it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownweightRule {
    /// First date of the interval (inclusive)
    pub start: NaiveDate,
    /// Last date of the interval (inclusive)
    pub end: NaiveDate,
    /// Weight assigned inside the interval
    pub weight: f64,
}

impl DownweightRule {
    /// Create a new downweight rule
    pub fn new(start: NaiveDate, end: NaiveDate, weight: f64) -> Self {
        Self { start, end, weight }
    }

    /// Whether the rule's interval contains the given date
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Feature construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Lag distances in days
    pub lags: Vec<u32>,
    /// Spans for the exponentially weighted moving averages
    pub ema_spans: Vec<u32>,
    /// Window sizes for rolling mean / standard deviation
    pub rolling_windows: Vec<u32>,
    /// Whether to add year-over-year lag / difference / ratio columns
    pub use_yoy: bool,
    /// Months (inclusive range) flagged as harvest season
    pub harvest_months: (u32, u32),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 2, 3, 7, 14, 21, 28, 56, 84],
            ema_spans: vec![7, 28],
            rolling_windows: vec![7, 14, 28, 56],
            use_yoy: false,
            harvest_months: (9, 11),
        }
    }
}

/// Immutable configuration for one commodity pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Commodity label, used as the output file prefix
    pub name: String,
    /// Date column header in the current source format
    pub date_column: String,
    /// Value column header in the current source format
    pub value_column: String,
    /// Date column header in the legacy source format
    pub legacy_date_column: String,
    /// Value column header in the legacy source format
    pub legacy_value_column: String,
    /// First calendar year of usable history
    pub train_start_year: i32,
    /// First date of the historical test window
    pub test_start: NaiveDate,
    /// Last date with ground truth used for test evaluation
    pub eval_end: NaiveDate,
    /// First day of the recursive forecast horizon
    pub forecast_start: NaiveDate,
    /// Last day of the recursive forecast horizon
    pub forecast_end: NaiveDate,
    /// Length of the validation window in calendar days, counted back
    /// from the last labeled date
    pub valid_window_days: i64,
    /// Size of the recent training window (in trend days) used to
    /// compute the fill vector medians
    pub fill_recent_days: f64,
    /// Feature construction parameters
    pub features: FeatureConfig,
    /// Calendar intervals whose training rows are downweighted
    pub downweight: Vec<DownweightRule>,
}

impl PipelineConfig {
    /// Preset for the onion wholesale series.
    ///
    /// Early 2022 is downweighted: stored-onion stock ran out and the
    /// price collapsed in a way that does not generalize.
    pub fn onion() -> Self {
        Self {
            name: "onion".to_string(),
            downweight: vec![DownweightRule::new(ymd(2022, 1, 1), ymd(2022, 4, 30), 0.3)],
            ..Self::default()
        }
    }

    /// Preset for the radish wholesale series
    pub fn radish() -> Self {
        Self {
            name: "radish".to_string(),
            downweight: vec![DownweightRule::new(ymd(2022, 5, 1), ymd(2022, 9, 30), 0.3)],
            ..Self::default()
        }
    }

    /// Preset for the napa cabbage wholesale series
    pub fn cabbage() -> Self {
        Self {
            name: "cabbage".to_string(),
            downweight: vec![
                DownweightRule::new(ymd(2022, 5, 1), ymd(2022, 9, 30), 0.3),
                DownweightRule::new(ymd(2023, 9, 1), ymd(2024, 9, 30), 0.3),
            ],
            ..Self::default()
        }
    }

    /// Look up a preset by commodity name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "onion" => Some(Self::onion()),
            "radish" => Some(Self::radish()),
            "cabbage" => Some(Self::cabbage()),
            _ => None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "commodity".to_string(),
            date_column: "일자".to_string(),
            value_column: "평균가".to_string(),
            legacy_date_column: "구분".to_string(),
            legacy_value_column: "평균".to_string(),
            train_start_year: 2020,
            test_start: ymd(2025, 1, 1),
            eval_end: ymd(2025, 9, 12),
            forecast_start: ymd(2025, 9, 13),
            forecast_end: ymd(2025, 12, 31),
            valid_window_days: 90,
            fill_recent_days: 180.0,
            features: FeatureConfig::default(),
            downweight: Vec::new(),
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}
