//! End-to-end forecasting pipeline for one commodity
//!
//! Wires the loader, feature builder, splitter, regressor factory and
//! recursive forecaster together and produces the tabular outputs
//! handed to downstream reporting.

use crate::config::PipelineConfig;
use crate::data::{PriceSeries, SeriesLoader};
use crate::error::Result;
use crate::features::FeatureBuilder;
use crate::forecast::{smooth_trailing, RecursiveForecaster};
use crate::metrics::{evaluate, EvalMetrics};
use crate::models::{FittedRegressor, RegressorFactory};
use crate::split::{gather_labeled, split};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

/// Smoothing window for the reported prediction series
const SMOOTH_WINDOW: usize = 7;

/// Historical evaluation table: `{date, actual, pred, pred_ma7}`
#[derive(Debug, Clone, Default)]
pub struct EvaluationTable {
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub pred: Vec<f64>,
    pub pred_ma7: Vec<f64>,
}

impl EvaluationTable {
    /// Convert to a DataFrame for interchange
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let df = DataFrame::new(vec![
            Series::new("date", self.dates.iter().map(|d| d.to_string()).collect::<Vec<_>>()),
            Series::new("actual", self.actual.clone()),
            Series::new("pred", self.pred.clone()),
            Series::new("pred_ma7", self.pred_ma7.clone()),
        ])?;
        Ok(df)
    }
}

/// Forecast-horizon table: `{date, pred, pred_ma7}`
#[derive(Debug, Clone, Default)]
pub struct ForecastTable {
    pub dates: Vec<NaiveDate>,
    pub pred: Vec<f64>,
    pub pred_ma7: Vec<f64>,
}

impl ForecastTable {
    /// Convert to a DataFrame for interchange
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let df = DataFrame::new(vec![
            Series::new("date", self.dates.iter().map(|d| d.to_string()).collect::<Vec<_>>()),
            Series::new("pred", self.pred.clone()),
            Series::new("pred_ma7", self.pred_ma7.clone()),
        ])?;
        Ok(df)
    }
}

/// Everything one pipeline run hands to downstream reporting
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Commodity label from the configuration
    pub commodity: String,
    /// Metrics over the validation window, absent in degraded mode
    pub validation: Option<EvalMetrics>,
    /// Metrics over the historical test window, absent when it is empty
    pub test: Option<EvalMetrics>,
    /// Historical test-window table
    pub evaluation: EvaluationTable,
    /// Forecast-horizon table
    pub forecast: ForecastTable,
}

impl PipelineReport {
    /// Write both tables as CSV under `out_dir`, prefixed with the
    /// commodity name
    pub fn write_csv<P: AsRef<Path>>(&self, out_dir: P) -> Result<()> {
        std::fs::create_dir_all(out_dir.as_ref())?;

        let eval_path = out_dir.as_ref().join(format!("{}_evaluation.csv", self.commodity));
        let mut eval_df = self.evaluation.to_dataframe()?;
        let mut file = std::fs::File::create(&eval_path)?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut eval_df)?;

        let forecast_path = out_dir.as_ref().join(format!("{}_forecast.csv", self.commodity));
        let mut forecast_df = self.forecast.to_dataframe()?;
        let mut file = std::fs::File::create(&forecast_path)?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut forecast_df)?;

        info!(
            evaluation = %eval_path.display(),
            forecast = %forecast_path.display(),
            "wrote pipeline outputs"
        );
        Ok(())
    }
}

/// One parameterized pipeline, reusable across commodities
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    factory: RegressorFactory,
}

impl Pipeline {
    /// Create a pipeline with the default regressor factory
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            factory: RegressorFactory::default(),
        }
    }

    /// Create a pipeline with an explicit regressor factory
    pub fn with_factory(config: PipelineConfig, factory: RegressorFactory) -> Self {
        Self { config, factory }
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load raw CSV files from a directory and run the full pipeline
    pub fn run<P: AsRef<Path>>(&self, data_dir: P) -> Result<PipelineReport> {
        let series = SeriesLoader::load_dir(data_dir, &self.config)?;
        self.run_series(&series)
    }

    /// Run the full pipeline on an already canonical price series
    pub fn run_series(&self, series: &PriceSeries) -> Result<PipelineReport> {
        let config = &self.config;
        let bounded =
            series.restrict_years(config.train_start_year, config.forecast_end.year())?;
        let skeleton = bounded.densify(config.forecast_end)?;

        let builder = FeatureBuilder::new(config.features.clone());
        let table = builder.build(&skeleton)?;

        let data = split(&table, config)?;
        info!(
            train = data.train.len(),
            valid = data.valid.len(),
            test = data.test.len(),
            "chronological split"
        );

        let valid = (!data.valid.is_empty()).then_some(&data.valid);
        let fitted = self.factory.fit(&data.train, valid)?;

        let validation = match valid {
            Some(valid) => {
                let preds = fitted.predict(&valid.features)?;
                let metrics = evaluate(&valid.targets, &preds)?;
                info!(window = "valid", %metrics);
                Some(metrics)
            }
            None => None,
        };

        let (test, evaluation) = if data.test.is_empty() {
            (None, EvaluationTable::default())
        } else {
            let preds = fitted.predict(&data.test.features)?;
            let metrics = evaluate(&data.test.targets, &preds)?;
            info!(window = "test", %metrics);
            let table = EvaluationTable {
                dates: data.test.dates.clone(),
                actual: data.test.targets.clone(),
                pred_ma7: smooth_trailing(&preds, SMOOTH_WINDOW),
                pred: preds,
            };
            (Some(metrics), table)
        };

        let forecaster = RecursiveForecaster::new(builder);
        let points = forecaster.forecast(
            &fitted,
            &data.forecast_base,
            config.forecast_start,
            config.forecast_end,
            table.feature_columns(),
            &data.fill,
        )?;
        let preds: Vec<f64> = points.iter().map(|p| p.pred).collect();
        let forecast = ForecastTable {
            dates: points.iter().map(|p| p.date).collect(),
            pred_ma7: smooth_trailing(&preds, SMOOTH_WINDOW),
            pred: preds,
        };

        Ok(PipelineReport {
            commodity: config.name.clone(),
            validation,
            test,
            evaluation,
            forecast,
        })
    }

    /// Historical experiment: fit on the labeled years
    /// `train_years.0..=train_years.1` and evaluate on `test_year`.
    /// Returns `None` (and logs) when either window is empty.
    pub fn backtest_years(
        &self,
        series: &PriceSeries,
        train_years: (i32, i32),
        test_year: i32,
    ) -> Result<Option<EvalMetrics>> {
        let end = NaiveDate::from_ymd_opt(test_year, 12, 31)
            .expect("valid calendar date");
        let skeleton = series.densify(end)?;

        let builder = FeatureBuilder::new(self.config.features.clone());
        let table = builder.build(&skeleton)?;

        let train = gather_labeled(&table, |date| {
            date.year() >= train_years.0 && date.year() <= train_years.1
        })?;
        let test = gather_labeled(&table, |date| date.year() == test_year)?;

        if train.is_empty() || test.is_empty() {
            info!(
                train = train.len(),
                test = test.len(),
                "backtest window too small, skipping"
            );
            return Ok(None);
        }

        let fitted = self.factory.fit(&train, Some(&test))?;
        let preds = fitted.predict(&test.features)?;
        let metrics = evaluate(&test.targets, &preds)?;
        info!(window = "backtest", %metrics);
        Ok(Some(metrics))
    }
}
