use assert_approx_eq::assert_approx_eq;
use chrono::{Duration, NaiveDate};
use wholesale_forecast::config::FeatureConfig;
use wholesale_forecast::data::PriceSeries;
use wholesale_forecast::error::Result;
use wholesale_forecast::features::FeatureBuilder;
use wholesale_forecast::forecast::{smooth_trailing, RecursiveForecaster};
use wholesale_forecast::models::FittedRegressor;
use wholesale_forecast::split::FillVector;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Reads a single feature column and returns it as the prediction
#[derive(Debug)]
struct EchoColumn {
    index: usize,
}

impl FittedRegressor for EchoColumn {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(rows.iter().map(|row| row[self.index]).collect())
    }

    fn name(&self) -> &str {
        "echo column"
    }
}

/// Extrapolates yesterday's value by yesterday's one-day change
#[derive(Debug)]
struct TrendFollower {
    lag_1: usize,
    diff_1: usize,
}

impl FittedRegressor for TrendFollower {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|row| row[self.lag_1] + row[self.diff_1])
            .collect())
    }

    fn name(&self) -> &str {
        "trend follower"
    }
}

#[derive(Debug)]
struct Constant(f64);

impl FittedRegressor for Constant {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(vec![self.0; rows.len()])
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Two years of daily values 100, 101, 102, ... densified 30 days past
/// the last observation
fn linear_series() -> (PriceSeries, NaiveDate) {
    let start = ymd(2023, 1, 1);
    let pairs: Vec<(NaiveDate, f64)> = (0..730)
        .map(|i| (start + Duration::days(i), 100.0 + i as f64))
        .collect();
    let last = pairs.last().unwrap().0;
    let series = PriceSeries::from_pairs(&pairs, "price").unwrap();
    let dense = series.densify(last + Duration::days(30)).unwrap();
    (dense, last)
}

fn column_index(columns: &[String], name: &str) -> usize {
    columns.iter().position(|c| c == name).unwrap()
}

#[test]
fn test_forecast_of_a_linear_trend_is_exact() {
    let (series, last) = linear_series();
    let builder = FeatureBuilder::new(FeatureConfig::default());
    let table = builder.build(&series).unwrap();
    let columns = table.feature_columns().to_vec();
    let fill = FillVector {
        values: vec![0.0; columns.len()],
    };

    let model = TrendFollower {
        lag_1: column_index(&columns, "lag_1"),
        diff_1: column_index(&columns, "diff_1"),
    };

    let forecaster = RecursiveForecaster::new(builder);
    let points = forecaster
        .forecast(
            &model,
            &series,
            last + Duration::days(1),
            last + Duration::days(30),
            &columns,
            &fill,
        )
        .unwrap();

    // The last observation is 829; extrapolating the one-day change
    // recursively continues the trend without drift
    assert_eq!(points.len(), 30);
    for (k, point) in points.iter().enumerate() {
        assert_eq!(point.date, last + Duration::days(k as i64 + 1));
        assert_approx_eq!(point.pred, 830.0 + k as f64, 1e-9);
    }
}

#[test]
fn test_echoing_the_last_value_is_self_consistent() {
    let (series, last) = linear_series();
    let builder = FeatureBuilder::new(FeatureConfig::default());
    let table = builder.build(&series).unwrap();
    let columns = table.feature_columns().to_vec();
    let fill = FillVector {
        values: vec![0.0; columns.len()],
    };

    let model = EchoColumn {
        index: column_index(&columns, "lag_1"),
    };

    let forecaster = RecursiveForecaster::new(builder);
    let points = forecaster
        .forecast(
            &model,
            &series,
            last + Duration::days(1),
            last + Duration::days(10),
            &columns,
            &fill,
        )
        .unwrap();

    // Each prediction feeds the next day's lag, so the echo holds the
    // last observed value across the whole horizon
    for point in &points {
        assert_approx_eq!(point.pred, 829.0, 1e-9);
    }
}

#[test]
fn test_empty_horizon_yields_no_points() {
    let (series, last) = linear_series();
    let builder = FeatureBuilder::new(FeatureConfig::default());
    let table = builder.build(&series).unwrap();
    let columns = table.feature_columns().to_vec();
    let fill = FillVector {
        values: vec![0.0; columns.len()],
    };

    let forecaster = RecursiveForecaster::new(builder);
    let points = forecaster
        .forecast(
            &Constant(1.0),
            &series,
            last + Duration::days(5),
            last + Duration::days(1),
            &columns,
            &fill,
        )
        .unwrap();
    assert!(points.is_empty());
}

#[test]
fn test_undefined_features_fall_back_to_the_fill_vector() {
    // A single observed day leaves rstd_7 undefined on the next day
    let pairs = vec![(ymd(2023, 6, 1), 50.0)];
    let series = PriceSeries::from_pairs(&pairs, "price").unwrap();

    let builder = FeatureBuilder::new(FeatureConfig::default());
    let table = builder.build(&series).unwrap();
    let columns = table.feature_columns().to_vec();
    let fill = FillVector {
        values: vec![7.0; columns.len()],
    };

    let model = EchoColumn {
        index: column_index(&columns, "rstd_7"),
    };
    let forecaster = RecursiveForecaster::new(builder);
    let points = forecaster
        .forecast(
            &model,
            &series,
            ymd(2023, 6, 2),
            ymd(2023, 6, 2),
            &columns,
            &fill,
        )
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_approx_eq!(points[0].pred, 7.0, 1e-12);
}

#[test]
fn test_days_before_the_series_use_the_fill_vector_wholesale() {
    let pairs = vec![(ymd(2023, 6, 10), 50.0)];
    let series = PriceSeries::from_pairs(&pairs, "price").unwrap();

    let builder = FeatureBuilder::new(FeatureConfig::default());
    let table = builder.build(&series).unwrap();
    let columns = table.feature_columns().to_vec();
    let fill = FillVector {
        values: vec![0.0; columns.len()],
    };

    let forecaster = RecursiveForecaster::new(builder);
    let points = forecaster
        .forecast(
            &Constant(42.0),
            &series,
            ymd(2023, 6, 7),
            ymd(2023, 6, 9),
            &columns,
            &fill,
        )
        .unwrap();

    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| p.pred == 42.0));
    assert_eq!(points[0].date, ymd(2023, 6, 7));
    assert_eq!(points[2].date, ymd(2023, 6, 9));
}

#[test]
fn test_smooth_trailing_moving_average() {
    let values: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    let smoothed = smooth_trailing(&values, 7);

    assert_eq!(smoothed.len(), 10);
    assert_approx_eq!(smoothed[0], 1.0, 1e-12);
    assert_approx_eq!(smoothed[3], 2.5, 1e-12);
    assert_approx_eq!(smoothed[6], 4.0, 1e-12);
    assert_approx_eq!(smoothed[9], 7.0, 1e-12);

    // A zero window clamps to one observation
    assert_eq!(smooth_trailing(&values, 0), values);
}
