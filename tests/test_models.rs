use assert_approx_eq::assert_approx_eq;
use wholesale_forecast::models::{
    FittedRegressor, GbtParams, GradientBoostedTrees, Regressor, RegressorFactory,
};
use wholesale_forecast::split::Dataset;
use wholesale_forecast::ForecastError;

/// Deterministic synthetic regression set: y = 2*x0 + 5*x1
fn sample_dataset(n: usize) -> Dataset {
    let mut data = Dataset::default();
    for i in 0..n {
        let x0 = i as f64;
        let x1 = (i % 7) as f64;
        let x2 = (i as f64 / 5.0).sin();
        data.features.push(vec![x0, x1, x2]);
        data.targets.push(2.0 * x0 + 5.0 * x1);
        data.weights.push(1.0);
    }
    data
}

#[test]
fn test_fit_is_deterministic_for_a_fixed_seed() {
    let train = sample_dataset(150);
    let params = GbtParams {
        n_estimators: 50,
        max_depth: 3,
        seed: 7,
        early_stopping_rounds: None,
        ..GbtParams::default()
    };

    let first = GradientBoostedTrees::new(params.clone()).fit(&train, None).unwrap();
    let second = GradientBoostedTrees::new(params).fit(&train, None).unwrap();

    let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 * 13.0, (i % 7) as f64, 0.2]).collect();
    assert_eq!(first.predict(&rows).unwrap(), second.predict(&rows).unwrap());
}

#[test]
fn test_fit_learns_a_linear_target() {
    let n = 200;
    let mut train = Dataset::default();
    for i in 0..n {
        train.features.push(vec![i as f64]);
        train.targets.push(3.0 * i as f64 + 10.0);
        train.weights.push(1.0);
    }

    let params = GbtParams {
        n_estimators: 300,
        learning_rate: 0.1,
        max_depth: 3,
        subsample: 1.0,
        colsample: 1.0,
        early_stopping_rounds: None,
        ..GbtParams::default()
    };
    let fitted = GradientBoostedTrees::new(params).fit(&train, None).unwrap();

    let preds = fitted.predict(&train.features).unwrap();
    let mae: f64 = train
        .targets
        .iter()
        .zip(preds.iter())
        .map(|(y, p)| (y - p).abs())
        .sum::<f64>()
        / n as f64;
    // Targets span 10..607; the in-sample fit should be tight
    assert!(mae < 10.0, "in-sample MAE too high: {}", mae);
}

#[test]
fn test_zero_weight_rows_do_not_move_the_fit() {
    // Identical feature values leave nothing to split on, so the model
    // reduces to its weighted base score
    let mut train = Dataset::default();
    for _ in 0..20 {
        train.features.push(vec![1.0]);
        train.targets.push(0.0);
        train.weights.push(0.0);
    }
    for _ in 0..20 {
        train.features.push(vec![1.0]);
        train.targets.push(100.0);
        train.weights.push(1.0);
    }

    let params = GbtParams {
        n_estimators: 20,
        subsample: 1.0,
        colsample: 1.0,
        early_stopping_rounds: None,
        ..GbtParams::default()
    };
    let fitted = GradientBoostedTrees::new(params).fit(&train, None).unwrap();
    let pred = fitted.predict_one(&[1.0]).unwrap();
    assert_approx_eq!(pred, 100.0, 1e-9);
}

#[test]
fn test_early_stopping_truncates_to_the_best_round() {
    // Validation targets are the negated training targets: every round
    // that helps training hurts validation, so the best length is 1
    let train = sample_dataset(120);
    let mut valid = train.clone();
    for y in valid.targets.iter_mut() {
        *y = -*y;
    }

    let params = GbtParams {
        n_estimators: 80,
        learning_rate: 0.2,
        max_depth: 3,
        subsample: 1.0,
        colsample: 1.0,
        early_stopping_rounds: Some(10),
        ..GbtParams::default()
    };
    let fitted = GradientBoostedTrees::new(params).fit(&train, Some(&valid)).unwrap();
    assert_eq!(fitted.n_trees(), 1);
}

#[test]
fn test_degraded_fit_keeps_every_round() {
    let train = sample_dataset(80);
    let params = GbtParams {
        n_estimators: 25,
        max_depth: 3,
        early_stopping_rounds: Some(5),
        ..GbtParams::default()
    };

    // Without a validation set there is nothing to stop on
    let fitted = GradientBoostedTrees::new(params.clone()).fit(&train, None).unwrap();
    assert_eq!(fitted.n_trees(), 25);

    // An empty validation set behaves the same way
    let empty = Dataset::default();
    let fitted = GradientBoostedTrees::new(params).fit(&train, Some(&empty)).unwrap();
    assert_eq!(fitted.n_trees(), 25);
}

#[test]
fn test_invalid_hyperparameters_are_rejected() {
    let train = sample_dataset(30);
    let cases = vec![
        GbtParams { n_estimators: 0, ..GbtParams::default() },
        GbtParams { learning_rate: 0.0, ..GbtParams::default() },
        GbtParams { max_depth: 0, ..GbtParams::default() },
        GbtParams { subsample: 0.0, ..GbtParams::default() },
        GbtParams { colsample: 1.5, ..GbtParams::default() },
        GbtParams { lambda: -1.0, ..GbtParams::default() },
    ];
    for params in cases {
        let result = GradientBoostedTrees::new(params).fit(&train, None);
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }
}

#[test]
fn test_invalid_datasets_are_rejected() {
    let model = GradientBoostedTrees::new(GbtParams::default());

    let empty = Dataset::default();
    assert!(matches!(
        model.fit(&empty, None),
        Err(ForecastError::EmptyTrainingSet)
    ));

    let mut negative = sample_dataset(10);
    negative.weights[3] = -0.5;
    assert!(model.fit(&negative, None).is_err());

    let mut all_zero = sample_dataset(10);
    all_zero.weights = vec![0.0; 10];
    assert!(model.fit(&all_zero, None).is_err());

    let mut ragged = sample_dataset(10);
    ragged.features[4].pop();
    assert!(model.fit(&ragged, None).is_err());
}

#[test]
fn test_factory_falls_back_to_the_next_candidate() {
    let train = sample_dataset(60);
    let bad = GbtParams {
        subsample: 0.0,
        ..GbtParams::default()
    };
    let good = GbtParams {
        n_estimators: 10,
        max_depth: 2,
        early_stopping_rounds: None,
        ..GbtParams::default()
    };

    let factory = RegressorFactory::new(vec![bad.clone(), good]);
    let fitted = factory.fit(&train, None).unwrap();
    assert_eq!(fitted.n_trees(), 10);

    // All candidates failing surfaces the last error
    let doomed = RegressorFactory::single(bad);
    assert!(doomed.fit(&train, None).is_err());
}

#[test]
fn test_predict_one_matches_predict() {
    let train = sample_dataset(60);
    let params = GbtParams {
        n_estimators: 15,
        max_depth: 3,
        early_stopping_rounds: None,
        ..GbtParams::default()
    };
    let fitted = GradientBoostedTrees::new(params).fit(&train, None).unwrap();

    let row = vec![42.0, 3.0, 0.5];
    let batch = fitted.predict(&[row.clone()]).unwrap();
    let single = fitted.predict_one(&row).unwrap();
    assert_eq!(batch[0], single);
}
