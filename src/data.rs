//! Loading and canonicalizing daily wholesale price records
//!
//! Raw source files are per-market daily CSV exports that arrive in two
//! header conventions. The loader resolves the format once per file,
//! parses records tolerantly (a record with an unparseable date or
//! value is dropped, never fatal), and merges everything into one
//! canonical `(date, value)` table deduplicated by per-date mean.

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Header convention of one raw source file, resolved once per file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Current export format: explicit date and average-price headers
    Modern { date: usize, value: usize },
    /// Older export format with a combined category/date column and a
    /// plain average column
    Legacy { date: usize, value: usize },
}

impl SourceFormat {
    /// Resolve the format from a header record, or fail with the
    /// missing value column
    pub fn detect(headers: &csv::StringRecord, config: &PipelineConfig) -> Result<Self> {
        let names: Vec<&str> = headers.iter().map(|h| h.trim()).collect();
        let position = |name: &str| names.iter().position(|h| *h == name);

        if let (Some(date), Some(value)) = (
            position(&config.date_column),
            position(&config.value_column),
        ) {
            return Ok(SourceFormat::Modern { date, value });
        }
        if let (Some(date), Some(value)) = (
            position(&config.legacy_date_column),
            position(&config.legacy_value_column),
        ) {
            return Ok(SourceFormat::Legacy { date, value });
        }

        Err(ForecastError::MissingColumn {
            column: format!("{}/{}", config.date_column, config.value_column),
        })
    }

    fn columns(&self) -> (usize, usize) {
        match *self {
            SourceFormat::Modern { date, value } | SourceFormat::Legacy { date, value } => {
                (date, value)
            }
        }
    }
}

/// Parse a raw date cell. Accepts YYYY.MM.DD, YYYY-MM-DD and
/// YYYY/MM/DD; everything but digits and separators is stripped.
pub fn parse_record_date(raw: &str) -> Result<NaiveDate> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '/'))
        .map(|c| if c == '-' || c == '/' { '.' } else { c })
        .collect();

    NaiveDate::parse_from_str(&cleaned, "%Y.%m.%d")
        .map_err(|_| ForecastError::UnparseableDate(raw.to_string()))
}

/// Parse a raw price cell. Thousands separators and a trailing currency
/// marker are stripped before numeric parsing.
pub fn parse_record_value(raw: &str) -> Result<f64> {
    let cleaned = raw.replace(',', "").replace('원', "");
    let value: f64 = cleaned
        .trim()
        .parse()
        .map_err(|_| ForecastError::UnparseableValue(raw.to_string()))?;

    if !value.is_finite() {
        return Err(ForecastError::UnparseableValue(raw.to_string()));
    }
    Ok(value)
}

/// Data loader for raw wholesale price files
#[derive(Debug)]
pub struct SeriesLoader;

impl SeriesLoader {
    /// Read one raw CSV file into `(date, value)` records.
    ///
    /// Records that fail date or value parsing are dropped; the loss is
    /// surfaced only as a reduced row count.
    pub fn read_csv<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<Vec<(NaiveDate, f64)>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let format = SourceFormat::detect(reader.headers()?, config)?;
        let (date_idx, value_idx) = format.columns();

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let date = row.get(date_idx).and_then(|s| parse_record_date(s).ok());
            let value = row.get(value_idx).and_then(|s| parse_record_value(s).ok());
            match (date, value) {
                (Some(date), Some(value)) => records.push((date, value)),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(
                path = %path.as_ref().display(),
                skipped,
                kept = records.len(),
                "dropped unparseable records"
            );
        }
        Ok(records)
    }

    /// Load and merge every `*.csv` file under a directory into one
    /// canonical price series
    pub fn load_dir<P: AsRef<Path>>(dir: P, config: &PipelineConfig) -> Result<PriceSeries> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "csv").unwrap_or(false))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(ForecastError::NoInputData {
                dir: dir.as_ref().display().to_string(),
            });
        }

        let mut records = Vec::new();
        for path in &paths {
            records.extend(Self::read_csv(path, config)?);
        }

        let series = PriceSeries::from_pairs(&records, &config.value_column)?;
        info!(
            files = paths.len(),
            days = series.len(),
            "loaded wholesale price series"
        );
        Ok(series)
    }
}

/// Canonical daily price series: one row per date, nullable value
///
/// Backed by a polars `DataFrame` with an epoch-millisecond `date`
/// column and one named value column. Dates are strictly unique and
/// ascending; gaps are allowed until [`PriceSeries::densify`].
#[derive(Debug, Clone)]
pub struct PriceSeries {
    df: DataFrame,
    value_column: String,
}

impl PriceSeries {
    /// Build a series from raw `(date, value)` pairs, averaging
    /// duplicate dates and sorting ascending
    pub fn from_pairs(pairs: &[(NaiveDate, f64)], value_column: &str) -> Result<Self> {
        let mut grouped: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
        for &(date, value) in pairs {
            let entry = grouped.entry(date).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        let dates: Vec<NaiveDate> = grouped.keys().copied().collect();
        let values: Vec<Option<f64>> = grouped
            .values()
            .map(|&(sum, n)| Some(sum / n as f64))
            .collect();
        Self::from_parts(&dates, &values, value_column)
    }

    /// Build a series from parallel date/value vectors (values may be
    /// unset). Dates must be unique; rows are sorted ascending.
    pub fn from_parts(
        dates: &[NaiveDate],
        values: &[Option<f64>],
        value_column: &str,
    ) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(ForecastError::DataError(format!(
                "Date count ({}) doesn't match value count ({})",
                dates.len(),
                values.len()
            )));
        }

        let mut rows: Vec<(NaiveDate, Option<f64>)> =
            dates.iter().copied().zip(values.iter().copied()).collect();
        rows.sort_by_key(|&(date, _)| date);

        let date_series = Series::new(
            "date",
            rows.iter()
                .map(|&(date, _)| date_to_millis(date))
                .collect::<Vec<i64>>(),
        );
        let value_series = Series::new(
            value_column,
            rows.iter().map(|&(_, value)| value).collect::<Vec<Option<f64>>>(),
        );

        let df = DataFrame::new(vec![date_series, value_series])?;
        Ok(Self {
            df,
            value_column: value_column.to_string(),
        })
    }

    /// Get the backing DataFrame
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Get the value column name
    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    /// Get the dates as a vector
    pub fn dates(&self) -> Vec<NaiveDate> {
        let col = match self.df.column("date") {
            Ok(col) => col,
            Err(_) => return Vec::new(),
        };
        col.i64()
            .map(|ca| {
                ca.into_iter()
                    .flatten()
                    .filter_map(millis_to_date)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the values as a vector, preserving unset entries
    pub fn values(&self) -> Vec<Option<f64>> {
        let col = match self.df.column(&self.value_column) {
            Ok(col) => col,
            Err(_) => return Vec::new(),
        };
        col.f64()
            .map(|ca| ca.into_iter().collect())
            .unwrap_or_default()
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.df.height()
    }

    /// First date of the series, if any
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates().first().copied()
    }

    /// Last date carrying a defined value, if any
    pub fn last_valued_date(&self) -> Option<NaiveDate> {
        self.dates()
            .into_iter()
            .zip(self.values())
            .filter(|(_, value)| value.is_some())
            .map(|(date, _)| date)
            .last()
    }

    /// Keep only rows whose calendar year lies in the inclusive range
    pub fn restrict_years(&self, first: i32, last: i32) -> Result<Self> {
        use chrono::Datelike;
        let kept: Vec<(NaiveDate, Option<f64>)> = self
            .dates()
            .into_iter()
            .zip(self.values())
            .filter(|(date, _)| date.year() >= first && date.year() <= last)
            .collect();

        let dates: Vec<NaiveDate> = kept.iter().map(|&(date, _)| date).collect();
        let values: Vec<Option<f64>> = kept.iter().map(|&(_, value)| value).collect();
        Self::from_parts(&dates, &values, &self.value_column)
    }

    /// Densify into a continuous daily skeleton from the first observed
    /// date through `end`, leaving unobserved values unset
    pub fn densify(&self, end: NaiveDate) -> Result<Self> {
        let start = self
            .first_date()
            .ok_or_else(|| ForecastError::DataError("Cannot densify an empty series".to_string()))?;
        if end < start {
            return Err(ForecastError::DataError(format!(
                "Skeleton end {} precedes first observation {}",
                end, start
            )));
        }

        let known: BTreeMap<NaiveDate, Option<f64>> =
            self.dates().into_iter().zip(self.values()).collect();

        let mut dates = Vec::new();
        let mut values = Vec::new();
        let mut day = start;
        while day <= end {
            dates.push(day);
            values.push(known.get(&day).copied().flatten());
            day = day.succ_opt().ok_or_else(|| {
                ForecastError::DataError("Date overflow while densifying".to_string())
            })?;
        }
        Self::from_parts(&dates, &values, &self.value_column)
    }
}

pub(crate) fn date_to_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_default()
}

pub(crate) fn millis_to_date(millis: i64) -> Option<NaiveDate> {
    NaiveDateTime::from_timestamp_opt(millis / 1000, 0).map(|dt| dt.date())
}
