//! # Wholesale Forecast
//!
//! A Rust library for forecasting daily wholesale commodity prices.
//!
//! ## Features
//!
//! - Tolerant loading of heterogeneous daily price CSV records
//! - Leakage-safe feature engineering (calendar, cyclical, trend, lag,
//!   EMA, rolling and difference features, all computed from a value
//!   series shifted by at least one day)
//! - Chronological train/validation/test splitting with calendar-based
//!   sample downweighting
//! - Gradient-boosted regression trees with sample weights and optional
//!   early stopping
//! - Recursive multi-day forecasting where each predicted day feeds the
//!   next day's features
//!
//! ## Quick Start
//!
//! ```no_run
//! use wholesale_forecast::config::PipelineConfig;
//! use wholesale_forecast::pipeline::Pipeline;
//!
//! # fn main() -> wholesale_forecast::error::Result<()> {
//! // One parameterized pipeline covers every commodity
//! let pipeline = Pipeline::new(PipelineConfig::onion());
//!
//! // Load raw CSVs, fit, evaluate, forecast
//! let report = pipeline.run("data/onion")?;
//!
//! if let Some(metrics) = &report.test {
//!     println!("TEST -> {}", metrics);
//! }
//! report.write_csv("outputs_daily")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod split;

// Re-export commonly used types
pub use crate::config::{DownweightRule, FeatureConfig, PipelineConfig};
pub use crate::data::{PriceSeries, SeriesLoader};
pub use crate::error::ForecastError;
pub use crate::features::{FeatureBuilder, FeatureTable};
pub use crate::forecast::{ForecastPoint, RecursiveForecaster};
pub use crate::metrics::EvalMetrics;
pub use crate::models::{FittedRegressor, Regressor, RegressorFactory};
pub use crate::pipeline::{Pipeline, PipelineReport};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
