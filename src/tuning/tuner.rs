//! Cross-validated hyperparameter search for one resolved estimator

use super::cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
use super::grid::ParameterGrid;
use crate::catalog::{ParamGrid, Params};
use crate::config::{FactoryConfig, SearchStrategy};
use crate::error::{FactoryError, Result};
use crate::estimators::{check_xy, Estimator, ResolvedEstimator};
use crate::scoring::Scorer;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of tuning one estimator
#[derive(Debug, Clone)]
pub struct TuneOutcome {
    /// Base parameters merged with the winning combination
    pub best_params: Params,
    /// Mean cross-validated score of the winner
    pub best_score: f64,
    pub cv_std: f64,
    /// Winner refitted on the whole training set
    pub best_model: Estimator,
    /// Combinations evaluated (1 for an empty grid)
    pub n_evaluated: usize,
    pub n_failed: usize,
    pub duration_secs: f64,
}

/// Grid or randomized search scored by k-fold cross-validation
#[derive(Debug, Clone)]
pub struct Tuner {
    strategy: SearchStrategy,
    cv_folds: usize,
    scorer: Option<Scorer>,
    random_state: Option<u64>,
    n_jobs: usize,
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Tuner {
    pub fn new(cv_folds: usize) -> Self {
        Self {
            strategy: SearchStrategy::Grid,
            cv_folds,
            scorer: None,
            random_state: None,
            n_jobs: 1,
        }
    }

    /// Tuner with the search settings of a run configuration
    pub fn from_config(config: &FactoryConfig) -> Result<Self> {
        let scorer = config.scoring.as_deref().map(Scorer::from_name).transpose()?;
        Ok(Self {
            strategy: config.strategy,
            cv_folds: config.cv_folds,
            scorer,
            random_state: config.random_state,
            n_jobs: config.n_jobs.max(1),
        })
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the estimator's default scorer
    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs.max(1);
        self
    }

    /// Scorer applied to an estimator of the given resolution
    pub fn scorer_for(&self, resolved: &ResolvedEstimator) -> Scorer {
        self.scorer.unwrap_or_else(|| resolved.task.default_scorer())
    }

    /// Search `search_grid` around `base_params` and refit the winner.
    ///
    /// Combinations that fail to construct, fit or score are logged and
    /// skipped; only when every one fails is the search an error. Exact
    /// score ties keep the earliest combination in grid order.
    pub fn tune(
        &self,
        resolved: &ResolvedEstimator,
        base_params: &Params,
        search_grid: &ParamGrid,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
    ) -> Result<TuneOutcome> {
        let start = Instant::now();
        check_xy(x_train, y_train)?;

        let scorer = self.scorer_for(resolved);
        let splits = CrossValidator::new(CVStrategy::for_task(resolved.task, self.cv_folds))
            .with_random_state(self.random_state)
            .split(y_train)?;

        for skipped in search_grid.skipped_axes() {
            debug!(model = %resolved.class_name, param = skipped, "Grid axis has no candidates, skipping");
        }

        let grid = ParameterGrid::new(search_grid);
        let candidates: Vec<Params> = if grid.is_empty() {
            vec![base_params.clone()]
        } else {
            grid.select(self.strategy, self.random_state)
                .into_iter()
                .map(|i| base_params.merged(&grid.combination_at(i)))
                .collect()
        };

        info!(
            model = %resolved.class_name,
            combinations = candidates.len(),
            folds = splits.len(),
            scorer = %scorer,
            "Starting hyperparameter search"
        );

        let results = self.evaluate_all(resolved, &candidates, x_train, y_train, &splits, scorer)?;

        let mut best: Option<(usize, CVResults)> = None;
        let mut n_failed = 0;
        let mut last_error = String::new();
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                Ok(cv) if cv.mean_score.is_finite() => {
                    debug!(model = %resolved.class_name, params = %candidates[idx], score = cv.mean_score, "Trial complete");
                    if best.as_ref().map_or(true, |(_, b)| cv.mean_score > b.mean_score) {
                        best = Some((idx, cv));
                    }
                }
                Ok(cv) => {
                    n_failed += 1;
                    last_error = format!("non-finite score {}", cv.mean_score);
                    warn!(model = %resolved.class_name, params = %candidates[idx], "Skipping trial with non-finite score");
                }
                Err(e) => {
                    n_failed += 1;
                    warn!(model = %resolved.class_name, params = %candidates[idx], error = %e, "Skipping failed trial");
                    last_error = e.to_string();
                }
            }
        }

        let (best_idx, best_cv) = best.ok_or_else(|| FactoryError::AllTrialsFailed {
            model_name: resolved.class_name.clone(),
            attempted: candidates.len(),
            last_error,
        })?;

        let best_params = candidates[best_idx].clone();
        let mut best_model = resolved.construct(&best_params)?;
        best_model.fit(x_train, y_train)?;

        let duration_secs = start.elapsed().as_secs_f64();
        info!(
            model = %resolved.class_name,
            params = %best_params,
            score = best_cv.mean_score,
            failed = n_failed,
            duration_secs,
            "Search finished"
        );

        Ok(TuneOutcome {
            best_params,
            best_score: best_cv.mean_score,
            cv_std: best_cv.std_score,
            best_model,
            n_evaluated: candidates.len(),
            n_failed,
            duration_secs,
        })
    }

    /// Score every candidate, keeping results in candidate order
    fn evaluate_all(
        &self,
        resolved: &ResolvedEstimator,
        candidates: &[Params],
        x: &Array2<f64>,
        y: &Array1<f64>,
        splits: &[CVSplit],
        scorer: Scorer,
    ) -> Result<Vec<Result<CVResults>>> {
        let evaluate = |params: &Params| cross_validate(resolved, params, x, y, splits, scorer);

        if self.n_jobs <= 1 || candidates.len() <= 1 {
            return Ok(candidates.iter().map(evaluate).collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .build()
            .map_err(|e| FactoryError::TrainingError(format!("cannot start worker pool: {}", e)))?;
        Ok(pool.install(|| candidates.par_iter().map(evaluate).collect()))
    }
}

/// Fit a fresh instance per fold and score it on the held-out part
fn cross_validate(
    resolved: &ResolvedEstimator,
    params: &Params,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splits: &[CVSplit],
    scorer: Scorer,
) -> Result<CVResults> {
    let scores = splits
        .iter()
        .map(|split| {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);

            let mut model = resolved.construct(params)?;
            model.fit(&x_train, &y_train)?;
            model.score(&x_test, &y_test, scorer)
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamValue;
    use crate::estimators::EstimatorRegistry;

    fn blobs(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let offset = if i % 2 == 0 { 0.0 } else { 4.0 };
            offset + ((i * 7 + j * 3) % 10) as f64 * 0.1
        });
        let y = Array1::from_iter((0..n).map(|i| (i % 2) as f64));
        (x, y)
    }

    #[test]
    fn test_empty_grid_uses_base_params() {
        let (x, y) = blobs(30);
        let resolved = EstimatorRegistry::with_builtins()
            .resolve_name("sklearn.neighbors", "KNeighborsClassifier")
            .unwrap();
        let base = Params::new().with("n_neighbors", 3i64);

        let outcome = Tuner::new(3)
            .with_random_state(0)
            .tune(&resolved, &base, &ParamGrid::new(), &x, &y)
            .unwrap();

        assert_eq!(outcome.best_params, base);
        assert_eq!(outcome.n_evaluated, 1);
        assert!(outcome.best_model.is_fitted());
        assert!(outcome.best_score > 0.9);
    }

    #[test]
    fn test_failed_combinations_are_skipped() {
        let (x, y) = blobs(30);
        let resolved = EstimatorRegistry::with_builtins()
            .resolve_name("sklearn.neighbors", "KNeighborsClassifier")
            .unwrap();
        let grid = ParamGrid::new().axis(
            "weights",
            vec!["bogus".into(), "uniform".into()],
        );

        let outcome = Tuner::new(3)
            .with_random_state(0)
            .tune(&resolved, &Params::new(), &grid, &x, &y)
            .unwrap();
        assert_eq!(outcome.n_failed, 1);
        assert_eq!(outcome.best_params.get("weights"), Some(&ParamValue::from("uniform")));
    }

    #[test]
    fn test_all_failed() {
        let (x, y) = blobs(30);
        let resolved = EstimatorRegistry::with_builtins()
            .resolve_name("sklearn.tree", "DecisionTreeClassifier")
            .unwrap();
        let grid = ParamGrid::new().axis("min_samples_split", vec![ParamValue::Int(0), ParamValue::Int(1)]);

        let err = Tuner::new(3).tune(&resolved, &Params::new(), &grid, &x, &y).unwrap_err();
        assert!(matches!(err, FactoryError::AllTrialsFailed { attempted: 2, .. }));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (x, y) = blobs(40);
        let resolved = EstimatorRegistry::with_builtins()
            .resolve_name("builtin", "DecisionTreeClassifier")
            .unwrap();
        let grid = ParamGrid::new()
            .axis("max_depth", vec![ParamValue::Int(1), ParamValue::Int(2), ParamValue::Int(3)])
            .axis("criterion", vec!["gini".into(), "entropy".into()]);

        let seq = Tuner::new(4).with_random_state(5).tune(&resolved, &Params::new(), &grid, &x, &y).unwrap();
        let par = Tuner::new(4)
            .with_random_state(5)
            .with_n_jobs(3)
            .tune(&resolved, &Params::new(), &grid, &x, &y)
            .unwrap();
        assert_eq!(seq.best_params, par.best_params);
        assert_eq!(seq.best_score, par.best_score);
    }

    #[test]
    fn test_scoring_override() {
        let resolved = EstimatorRegistry::with_builtins()
            .resolve_name("builtin", "LinearRegression")
            .unwrap();
        let tuner = Tuner::new(3);
        assert_eq!(tuner.scorer_for(&resolved), Scorer::R2);
        assert_eq!(tuner.with_scorer(Scorer::NegMeanAbsoluteError).scorer_for(&resolved), Scorer::NegMeanAbsoluteError);
    }
}
