//! Built-in estimators and the registry that resolves catalog references
//!
//! The estimator set is closed: every model the factory can build is a
//! variant of [`Estimator`]. Catalog entries reach them through an
//! [`EstimatorRegistry`], which maps `module` / `class` strings to
//! constructor functions.

mod registry;
pub mod linear;
pub mod naive_bayes;
pub mod neighbors;
pub mod tree;
pub mod forest;

pub use registry::{EstimatorConstructor, EstimatorRegistry, ResolvedEstimator};
pub use forest::RandomForest;
pub use linear::{LinearRegression, LogisticRegression};
pub use naive_bayes::GaussianNB;
pub use neighbors::{KNeighbors, WeightScheme};
pub use tree::{Criterion, DecisionTree, MaxFeatures, TreeNode};

use crate::error::{FactoryError, Result};
use crate::scoring::{Scorer, TaskKind};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Capabilities shared by every built-in model
pub trait Model {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Task this model solves
    fn task(&self) -> TaskKind;

    fn is_fitted(&self) -> bool;
}

/// A configured (and possibly fitted) estimator from the closed built-in set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    LogisticRegression(LogisticRegression),
    LinearRegression(LinearRegression),
    KNeighbors(KNeighbors),
    GaussianNB(GaussianNB),
}

impl Estimator {
    fn as_model(&self) -> &dyn Model {
        match self {
            Estimator::DecisionTree(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::LogisticRegression(m) => m,
            Estimator::LinearRegression(m) => m,
            Estimator::KNeighbors(m) => m,
            Estimator::GaussianNB(m) => m,
        }
    }

    fn as_model_mut(&mut self) -> &mut dyn Model {
        match self {
            Estimator::DecisionTree(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::LogisticRegression(m) => m,
            Estimator::LinearRegression(m) => m,
            Estimator::KNeighbors(m) => m,
            Estimator::GaussianNB(m) => m,
        }
    }

    /// Fit on `x`/`y` after checking that shapes agree
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.as_model_mut().fit(x, y)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(FactoryError::ModelNotFitted);
        }
        self.as_model().predict(x)
    }

    /// Predict `x` and score against `y`
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>, scorer: Scorer) -> Result<f64> {
        let y_pred = self.predict(x)?;
        scorer.score(y, &y_pred)
    }

    /// Score with the task's default scorer
    pub fn default_score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.score(x, y, self.task().default_scorer())
    }

    pub fn task(&self) -> TaskKind {
        self.as_model().task()
    }

    pub fn is_fitted(&self) -> bool {
        self.as_model().is_fitted()
    }

    /// Short name of the underlying model family
    pub fn family(&self) -> &'static str {
        match self {
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::RandomForest(_) => "random_forest",
            Estimator::LogisticRegression(_) => "logistic_regression",
            Estimator::LinearRegression(_) => "linear_regression",
            Estimator::KNeighbors(_) => "k_neighbors",
            Estimator::GaussianNB(_) => "gaussian_nb",
        }
    }
}

pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(FactoryError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(FactoryError::ValidationError("cannot fit on zero samples".to_string()));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(FactoryError::ValidationError(
            "input contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(FactoryError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Sorted distinct class labels
pub(crate) fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().collect();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();
    classes
}

/// Position of `value` in a sorted class list
pub(crate) fn class_index(classes: &[f64], value: f64) -> Option<usize> {
    classes
        .binary_search_by(|c| c.partial_cmp(&value).unwrap_or(std::cmp::Ordering::Less))
        .ok()
}
