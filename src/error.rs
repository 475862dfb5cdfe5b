//! Error types for the wholesale-forecast crate

use thiserror::Error;

/// Custom error types for the wholesale-forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A required column is absent after loader normalization
    #[error("Missing column: '{column}'")]
    MissingColumn { column: String },

    /// No usable training rows remain after date filtering and
    /// missing-value exclusion
    #[error("Empty training set: no usable rows after filtering")]
    EmptyTrainingSet,

    /// No CSV files were found under the input directory
    #[error("No input data found in '{dir}'")]
    NoInputData { dir: String },

    /// A single record carries a date that cannot be parsed; recovered
    /// locally by the loader, never fatal to a run
    #[error("Unparseable date: '{0}'")]
    UnparseableDate(String),

    /// A single record carries a value that cannot be parsed; recovered
    /// locally by the loader, never fatal to a run
    #[error("Unparseable value: '{0}'")]
    UnparseableValue(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<polars::prelude::PolarsError> for ForecastError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
