//! Random forest over bootstrapped CART trees

use super::tree::{DecisionTree, MaxFeatures, TREE_PARAMS};
use super::{check_features, unique_classes, Model};
use crate::catalog::Params;
use crate::error::{FactoryError, Result};
use crate::scoring::TaskKind;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Template every tree is cloned from
    template: DecisionTree,
    pub n_estimators: usize,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    task: TaskKind,
    n_features: usize,
    classes: Vec<f64>,
}

impl RandomForest {
    /// Create a new random forest classifier
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self::new(
            TaskKind::Classification,
            DecisionTree::new_classifier().with_max_features(MaxFeatures::Sqrt),
            n_estimators,
        )
    }

    /// Create a new random forest regressor
    pub fn new_regressor(n_estimators: usize) -> Self {
        Self::new(TaskKind::Regression, DecisionTree::new_regressor(), n_estimators)
    }

    fn new(task: TaskKind, template: DecisionTree, n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            template,
            n_estimators,
            bootstrap: true,
            random_state: None,
            task,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Build an unfitted forest from catalog parameters
    pub fn from_params(params: &Params, task: TaskKind) -> Result<Self> {
        let name = match task {
            TaskKind::Classification => "RandomForestClassifier",
            TaskKind::Regression => "RandomForestRegressor",
        };
        let mut allowed = TREE_PARAMS.to_vec();
        allowed.extend_from_slice(&["n_estimators", "bootstrap"]);
        params.ensure_known(name, &allowed)?;

        let n_estimators = params.usize_or("n_estimators", 100)?;
        if n_estimators == 0 {
            return Err(FactoryError::invalid_param("n_estimators", 0, "must be at least 1"));
        }

        let mut forest = match task {
            TaskKind::Classification => Self::new_classifier(n_estimators),
            TaskKind::Regression => Self::new_regressor(n_estimators),
        };
        forest.template.apply_params(params)?;
        forest.bootstrap = params.bool_or("bootstrap", true)?;
        forest.random_state = forest.template.random_state;
        Ok(forest)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.template = self.template.with_max_depth(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.template = self.template.with_max_features(max_features);
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn grow_tree(&self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<DecisionTree> {
        let n_samples = x.nrows();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut tree = self.template.clone().with_random_state(rng.gen());
        if self.bootstrap {
            let sample_indices: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let x_boot = x.select(Axis(0), &sample_indices);
            let y_boot = y.select(Axis(0), &sample_indices);
            tree.fit_with_classes(&x_boot, &y_boot, self.classes.clone())?;
        } else {
            tree.fit_with_classes(x, y, self.classes.clone())?;
        }
        Ok(tree)
    }
}

impl Model for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.n_features = x.ncols();
        self.classes = match self.task {
            TaskKind::Classification => unique_classes(y),
            TaskKind::Regression => Vec::new(),
        };

        let base_seed = self.random_state.unwrap_or(42);
        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| self.grow_tree(x, y, base_seed.wrapping_add(tree_idx as u64)))
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(FactoryError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let n_trees = all_predictions.len() as f64;
        let predictions = (0..x.nrows()).map(|i| match self.task {
            TaskKind::Classification => {
                let mut votes = vec![0usize; self.classes.len()];
                for preds in &all_predictions {
                    if let Some(c) = super::class_index(&self.classes, preds[i]) {
                        votes[c] += 1;
                    }
                }
                // majority vote, ties go to the smallest label
                let mut best = 0;
                for (c, &v) in votes.iter().enumerate() {
                    if v > votes[best] {
                        best = c;
                    }
                }
                self.classes[best]
            }
            TaskKind::Regression => all_predictions.iter().map(|p| p[i]).sum::<f64>() / n_trees,
        });

        Ok(Array1::from_iter(predictions))
    }

    fn task(&self) -> TaskKind {
        self.task
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f64 * 0.1;
            rows.extend_from_slice(&[jitter, 1.0 - jitter]);
            labels.push(0.0);
            rows.extend_from_slice(&[5.0 + jitter, 4.0 - jitter]);
            labels.push(1.0);
        }
        (Array2::from_shape_vec((40, 2), rows).unwrap(), Array1::from_vec(labels))
    }

    #[test]
    fn test_classifier_separates_blobs() {
        let (x, y) = two_blobs();
        let mut forest = RandomForest::new_classifier(10).with_random_state(7);
        forest.fit(&x, &y).unwrap();

        assert_eq!(forest.n_trees(), 10);
        let pred = forest.predict(&array![[0.2, 0.8], [5.1, 3.9]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let (x, y) = two_blobs();
        let mut a = RandomForest::new_regressor(5).with_random_state(3);
        let mut b = RandomForest::new_regressor(5).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_from_params() {
        let params = Params::new()
            .with("n_estimators", 25i64)
            .with("max_depth", 4i64)
            .with("bootstrap", false)
            .with("random_state", 1i64);
        let forest = RandomForest::from_params(&params, TaskKind::Classification).unwrap();
        assert_eq!(forest.n_estimators, 25);
        assert!(!forest.bootstrap);
        assert_eq!(forest.random_state, Some(1));
        assert_eq!(forest.template.max_depth, Some(4));
    }

    #[test]
    fn test_zero_estimators_rejected() {
        let params = Params::new().with("n_estimators", 0i64);
        assert!(RandomForest::from_params(&params, TaskKind::Regression).is_err());
    }
}
