use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use model_factory::catalog::{ParamGrid, ParamValue, Params};
use model_factory::estimators::EstimatorRegistry;
use model_factory::tuning::Tuner;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let y = Array1::from_iter((0..n_rows).map(|i| (i % 2) as f64));
    let x = Array2::from_shape_fn((n_rows, n_features), |(i, _)| {
        y[i] * 2.0 + rng.gen::<f64>() * 3.0
    });
    (x, y)
}

fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);

    let registry = EstimatorRegistry::with_builtins();
    let tree = registry.resolve_name("sklearn.tree", "DecisionTreeClassifier").unwrap();
    let grid = ParamGrid::new()
        .axis("max_depth", vec![ParamValue::Int(3), ParamValue::Int(5), ParamValue::Int(8)])
        .axis("criterion", vec!["gini".into(), "entropy".into()]);

    for n_rows in [500, 2000].iter() {
        let (x, y) = create_classification_data(*n_rows, 8);

        group.bench_with_input(BenchmarkId::new("decision_tree", n_rows), &(x, y), |b, (x, y)| {
            b.iter(|| {
                Tuner::new(5)
                    .with_random_state(42)
                    .tune(&tree, &Params::new(), &grid, black_box(x), black_box(y))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_parallel_trials(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_trials");
    group.sample_size(10);

    let registry = EstimatorRegistry::with_builtins();
    let knn = registry.resolve_name("sklearn.neighbors", "KNeighborsClassifier").unwrap();
    let grid = ParamGrid::new()
        .axis("n_neighbors", vec![ParamValue::Int(3), ParamValue::Int(5), ParamValue::Int(9)])
        .axis("weights", vec!["uniform".into(), "distance".into()]);
    let (x, y) = create_classification_data(1000, 6);

    for n_jobs in [1, 4].iter() {
        group.bench_with_input(BenchmarkId::new("knn", n_jobs), n_jobs, |b, &n_jobs| {
            b.iter(|| {
                Tuner::new(5)
                    .with_random_state(42)
                    .with_n_jobs(n_jobs)
                    .tune(&knn, &Params::new(), &grid, black_box(&x), black_box(&y))
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grid_search, bench_parallel_trials);
criterion_main!(benches);
