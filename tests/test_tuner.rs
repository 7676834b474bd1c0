//! Integration test: hyperparameter search and refit

use model_factory::catalog::{ParamGrid, ParamValue, Params};
use model_factory::config::SearchStrategy;
use model_factory::error::FactoryError;
use model_factory::estimators::{Estimator, EstimatorRegistry, KNeighbors};
use model_factory::scoring::TaskKind;
use model_factory::tuning::Tuner;
use ndarray::{Array1, Array2};
use std::sync::atomic::{AtomicUsize, Ordering};

fn two_blobs(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 3), |(i, j)| {
        let center = if i % 2 == 0 { 0.0 } else { 5.0 };
        center + ((i * 13 + j * 7) % 11) as f64 * 0.1
    });
    let y = Array1::from_iter((0..n).map(|i| (i % 2) as f64));
    (x, y)
}

fn knn_grid() -> ParamGrid {
    ParamGrid::new()
        .axis("n_neighbors", vec![ParamValue::Int(3), ParamValue::Int(5)])
        .axis("weights", vec!["uniform".into(), "distance".into()])
}

static KNN_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

#[test]
fn test_fresh_estimator_per_fold_and_refit() {
    let mut registry = EstimatorRegistry::new();
    registry.register("counting", "KNeighborsClassifier", TaskKind::Classification, |p| {
        KNN_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Ok(Estimator::KNeighbors(KNeighbors::from_params(p, TaskKind::Classification)?))
    });
    let resolved = registry.resolve_name("counting", "KNeighborsClassifier").unwrap();
    let (x, y) = two_blobs(100);

    let outcome = Tuner::new(5)
        .with_random_state(42)
        .tune(&resolved, &Params::new(), &knn_grid(), &x, &y)
        .unwrap();

    // 4 combinations x 5 folds, plus the refit
    assert_eq!(KNN_CONSTRUCTED.load(Ordering::SeqCst), 21);
    assert_eq!(outcome.n_evaluated, 4);
    assert_eq!(outcome.n_failed, 0);

    match &outcome.best_model {
        Estimator::KNeighbors(knn) => assert_eq!(knn.n_samples_fit(), 100),
        other => panic!("unexpected estimator {}", other.family()),
    }
}

static EMPTY_GRID_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

#[test]
fn test_empty_grid_fits_once_on_full_set() {
    let mut registry = EstimatorRegistry::new();
    registry.register("counting", "KNeighborsClassifier", TaskKind::Classification, |p| {
        EMPTY_GRID_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Ok(Estimator::KNeighbors(KNeighbors::from_params(p, TaskKind::Classification)?))
    });
    let resolved = registry.resolve_name("counting", "KNeighborsClassifier").unwrap();
    let (x, y) = two_blobs(90);
    let base = Params::new().with("n_neighbors", 7i64);
    let grid = ParamGrid::new().axis("weights", vec![]);

    let outcome = Tuner::new(3)
        .with_random_state(42)
        .tune(&resolved, &base, &grid, &x, &y)
        .unwrap();

    // one construction per fold, plus the single full fit
    assert_eq!(EMPTY_GRID_CONSTRUCTED.load(Ordering::SeqCst), 4);
    assert_eq!(outcome.best_params, base);
    assert_eq!(outcome.n_evaluated, 1);
    match &outcome.best_model {
        Estimator::KNeighbors(knn) => assert_eq!(knn.n_samples_fit(), 90),
        other => panic!("unexpected estimator {}", other.family()),
    }
}

#[test]
fn test_best_params_include_base_params() {
    let resolved = EstimatorRegistry::with_builtins()
        .resolve_name("sklearn.neighbors", "KNeighborsClassifier")
        .unwrap();
    let (x, y) = two_blobs(60);
    let base = Params::new().with("p", 1i64);

    let outcome = Tuner::new(3)
        .with_random_state(1)
        .tune(&resolved, &base, &knn_grid(), &x, &y)
        .unwrap();

    assert_eq!(outcome.best_params.get("p"), Some(&ParamValue::Int(1)));
    assert!(outcome.best_params.contains("n_neighbors"));
    assert!(outcome.best_params.contains("weights"));
    assert!(outcome.best_score >= 0.95);
}

#[test]
fn test_equal_scores_keep_first_combination() {
    let resolved = EstimatorRegistry::with_builtins()
        .resolve_name("sklearn.naive_bayes", "GaussianNB")
        .unwrap();
    let (x, y) = two_blobs(60);
    let grid = ParamGrid::new().axis(
        "var_smoothing",
        vec![ParamValue::Float(1e-8), ParamValue::Float(1e-9), ParamValue::Float(1e-7)],
    );

    let outcome = Tuner::new(3)
        .with_random_state(3)
        .tune(&resolved, &Params::new(), &grid, &x, &y)
        .unwrap();

    assert_eq!(outcome.best_score, 1.0);
    assert_eq!(outcome.best_params.get("var_smoothing"), Some(&ParamValue::Float(1e-8)));
}

#[test]
fn test_repeated_search_is_deterministic() {
    let resolved = EstimatorRegistry::with_builtins()
        .resolve_name("sklearn.ensemble", "RandomForestClassifier")
        .unwrap();
    let (x, y) = two_blobs(50);
    let base = Params::new().with("random_state", 11i64).with("n_estimators", 5i64);
    let grid = ParamGrid::new()
        .axis("max_depth", vec![ParamValue::Int(1), ParamValue::Int(3)])
        .axis("max_features", vec!["sqrt".into(), ParamValue::Null]);

    let tuner = Tuner::new(4).with_random_state(9);
    let first = tuner.tune(&resolved, &base, &grid, &x, &y).unwrap();
    let second = tuner.tune(&resolved, &base, &grid, &x, &y).unwrap();

    assert_eq!(first.best_params, second.best_params);
    assert_eq!(first.best_score, second.best_score);
    assert_eq!(first.best_model.predict(&x).unwrap(), second.best_model.predict(&x).unwrap());
}

#[test]
fn test_random_search_samples_distinct_combinations() {
    let resolved = EstimatorRegistry::with_builtins()
        .resolve_name("builtin", "DecisionTreeClassifier")
        .unwrap();
    let (x, y) = two_blobs(40);
    let grid = ParamGrid::new()
        .axis("max_depth", vec![ParamValue::Int(1), ParamValue::Int(2), ParamValue::Int(3)])
        .axis("criterion", vec!["gini".into(), "entropy".into()]);

    let sampled = Tuner::new(3)
        .with_strategy(SearchStrategy::Random { n_iter: 2 })
        .with_random_state(0)
        .tune(&resolved, &Params::new(), &grid, &x, &y)
        .unwrap();
    assert_eq!(sampled.n_evaluated, 2);

    let exhaustive = Tuner::new(3)
        .with_strategy(SearchStrategy::Random { n_iter: 50 })
        .with_random_state(0)
        .tune(&resolved, &Params::new(), &grid, &x, &y)
        .unwrap();
    assert_eq!(exhaustive.n_evaluated, 6);
}

#[test]
fn test_too_few_samples_for_folds() {
    let resolved = EstimatorRegistry::with_builtins()
        .resolve_name("builtin", "GaussianNB")
        .unwrap();
    let (x, y) = two_blobs(4);

    let err = Tuner::new(5).tune(&resolved, &Params::new(), &ParamGrid::new(), &x, &y).unwrap_err();
    assert!(matches!(err, FactoryError::ValidationError(_)), "got {:?}", err);
}

#[test]
fn test_regression_search() {
    let resolved = EstimatorRegistry::with_builtins()
        .resolve_name("sklearn.linear_model", "Ridge")
        .unwrap();
    let x = Array2::from_shape_fn((40, 2), |(i, j)| (i as f64) * 0.5 + (j as f64) * ((i % 3) as f64));
    let y = x.column(0).mapv(|v| 2.0 * v) + &x.column(1).mapv(|v| -v) + 1.0;
    let grid = ParamGrid::new().axis(
        "alpha",
        vec![ParamValue::Float(100.0), ParamValue::Float(0.001)],
    );

    let outcome = Tuner::new(4)
        .with_random_state(2)
        .tune(&resolved, &Params::new(), &grid, &x, &y)
        .unwrap();

    assert_eq!(outcome.best_params.get("alpha"), Some(&ParamValue::Float(0.001)));
    assert!(outcome.best_score > 0.99);
}
