use assert_approx_eq::assert_approx_eq;
use chrono::{Duration, NaiveDate};
use rstest::rstest;
use wholesale_forecast::config::{DownweightRule, FeatureConfig, PipelineConfig};
use wholesale_forecast::features::{FeatureBuilder, FeatureTable};
use wholesale_forecast::split::{apply_downweights, gather_labeled, split};
use wholesale_forecast::ForecastError;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Daily table starting 2020-01-01: labeled for `labeled` days, then
/// unlabeled skeleton rows up to `total` days
fn sample_table(labeled: usize, total: usize) -> FeatureTable {
    let start = ymd(2020, 1, 1);
    let dates: Vec<NaiveDate> = (0..total).map(|i| start + Duration::days(i as i64)).collect();
    let values: Vec<Option<f64>> = (0..total)
        .map(|i| (i < labeled).then(|| 1000.0 + 100.0 * (i as f64 / 30.0).sin()))
        .collect();
    FeatureBuilder::new(FeatureConfig::default())
        .build_from_parts(&dates, &values)
        .unwrap()
}

fn sample_config() -> PipelineConfig {
    PipelineConfig {
        test_start: ymd(2022, 1, 1),
        eval_end: ymd(2022, 6, 30),
        forecast_start: ymd(2023, 1, 1),
        forecast_end: ymd(2023, 3, 31),
        downweight: vec![DownweightRule::new(ymd(2022, 1, 1), ymd(2022, 4, 30), 0.3)],
        ..PipelineConfig::default()
    }
}

#[rstest]
#[case(ymd(2021, 12, 31), 1.0)]
#[case(ymd(2022, 1, 1), 0.3)]
#[case(ymd(2022, 2, 15), 0.3)]
#[case(ymd(2022, 4, 30), 0.3)]
#[case(ymd(2022, 5, 1), 1.0)]
fn test_downweight_rule_boundaries(#[case] date: NaiveDate, #[case] expected: f64) {
    let rules = vec![DownweightRule::new(ymd(2022, 1, 1), ymd(2022, 4, 30), 0.3)];
    let weights = apply_downweights(&[date], &rules);
    assert_approx_eq!(weights[0], expected, 1e-12);
}

#[test]
fn test_downweights_compose_by_minimum() {
    let dates = vec![ymd(2022, 2, 1)];
    let rules = vec![
        DownweightRule::new(ymd(2022, 1, 1), ymd(2022, 3, 31), 0.5),
        DownweightRule::new(ymd(2022, 1, 15), ymd(2022, 2, 15), 0.9),
        DownweightRule::new(ymd(2022, 1, 20), ymd(2022, 2, 10), 0.3),
    ];
    // Overlaps can only lower the weight, never raise it
    assert_approx_eq!(apply_downweights(&dates, &rules)[0], 0.3, 1e-12);

    // Applying the same rule twice changes nothing
    let once = apply_downweights(&dates, &rules[..1]);
    let twice = apply_downweights(&dates, &[rules[0].clone(), rules[0].clone()]);
    assert_eq!(once, twice);
}

#[test]
fn test_split_is_anchored_on_last_labeled_date() {
    // Labeled through 2022-12-31, skeleton rows through 2023-03-31
    let table = sample_table(1096, 1186);
    let data = split(&table, &sample_config()).unwrap();

    // 90-day validation window counted back from the last label, not
    // from the last skeleton row
    assert_eq!(data.valid.len(), 90);
    assert_eq!(data.valid.dates.first(), Some(&ymd(2022, 10, 3)));
    assert_eq!(data.valid.dates.last(), Some(&ymd(2022, 12, 31)));

    // Training is strictly before the cut; the first rows fall away
    // until every lag column is defined
    assert_eq!(data.train.dates.first(), Some(&ymd(2020, 3, 25)));
    assert_eq!(data.train.dates.last(), Some(&ymd(2022, 10, 2)));

    // Test window straight from the configuration
    assert_eq!(data.test.len(), 181);
    assert_eq!(data.test.dates.first(), Some(&ymd(2022, 1, 1)));
    assert_eq!(data.test.dates.last(), Some(&ymd(2022, 6, 30)));
}

#[test]
fn test_split_training_rows_are_fully_defined() {
    let table = sample_table(1096, 1186);
    let data = split(&table, &sample_config()).unwrap();

    let width = table.feature_columns().len();
    for row in data.train.features.iter().chain(data.valid.features.iter()) {
        assert_eq!(row.len(), width);
        assert!(row.iter().all(|v| v.is_finite()));
    }
    assert!(data.train.targets.iter().all(|y| y.is_finite()));
}

#[test]
fn test_split_applies_downweights_to_training_only() {
    let table = sample_table(1096, 1186);
    let data = split(&table, &sample_config()).unwrap();

    let weight_at = |date: NaiveDate| {
        let i = data.train.dates.iter().position(|&d| d == date).unwrap();
        data.train.weights[i]
    };
    assert_approx_eq!(weight_at(ymd(2022, 2, 15)), 0.3, 1e-12);
    assert_approx_eq!(weight_at(ymd(2022, 5, 1)), 1.0, 1e-12);
    assert_approx_eq!(weight_at(ymd(2021, 7, 1)), 1.0, 1e-12);

    assert!(data.valid.weights.iter().all(|&w| w == 1.0));
    assert!(data.test.weights.iter().all(|&w| w == 1.0));
}

#[test]
fn test_split_fill_vector_uses_recent_training_medians() {
    let table = sample_table(1096, 1186);
    let config = sample_config();
    let data = split(&table, &config).unwrap();

    assert_eq!(data.fill.values.len(), table.feature_columns().len());

    // Trend at the last training row is 1005 days; the fill median runs
    // over the trailing 180 trend days, so median(825..=1005) = 915
    let trend_idx = table
        .feature_columns()
        .iter()
        .position(|name| name == "trend")
        .unwrap();
    assert_approx_eq!(data.fill.values[trend_idx], 915.0, 1e-9);
}

#[test]
fn test_split_forecast_base_spans_the_whole_skeleton() {
    let table = sample_table(1096, 1186);
    let data = split(&table, &sample_config()).unwrap();

    assert_eq!(data.forecast_base.len(), 1186);
    assert_eq!(data.forecast_base.last_valued_date(), Some(ymd(2022, 12, 31)));
}

#[test]
fn test_split_fails_without_complete_training_rows() {
    // 60 labeled days can never define an 84-day lag
    let table = sample_table(60, 60);
    let result = split(&table, &sample_config());
    assert!(matches!(result, Err(ForecastError::EmptyTrainingSet)));
}

#[test]
fn test_split_tolerates_empty_validation_window() {
    let table = sample_table(1096, 1186);
    let config = PipelineConfig {
        valid_window_days: 0,
        ..sample_config()
    };
    let data = split(&table, &config).unwrap();

    // Degraded mode: every complete labeled row goes to training
    assert!(data.valid.is_empty());
    assert_eq!(data.train.dates.last(), Some(&ymd(2022, 12, 31)));
}

#[test]
fn test_gather_labeled_by_year() {
    let table = sample_table(1096, 1186);
    let set = gather_labeled(&table, |date| {
        use chrono::Datelike;
        date.year() == 2021
    })
    .unwrap();

    assert_eq!(set.len(), 365);
    assert_eq!(set.dates.first(), Some(&ymd(2021, 1, 1)));
    assert_eq!(set.dates.last(), Some(&ymd(2021, 12, 31)));
    assert!(set.weights.iter().all(|&w| w == 1.0));

    // A predicate with no matching labeled rows yields an empty set
    let empty = gather_labeled(&table, |date| {
        use chrono::Datelike;
        date.year() == 2019
    })
    .unwrap();
    assert!(empty.is_empty());
}
