//! Linear models: least squares, ridge and logistic regression

use super::{check_features, unique_classes, Model};
use crate::catalog::Params;
use crate::error::{FactoryError, Result};
use crate::scoring::TaskKind;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Solve `a * x = b` for symmetric positive definite `a` via Cholesky.
///
/// A semi-definite `a` (collinear features) is retried with a small,
/// growing diagonal jitter before giving up.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    let scale = a.diag().iter().map(|v| v.abs()).sum::<f64>().max(1.0) / n.max(1) as f64;

    for jitter in [0.0, 1e-10, 1e-8, 1e-6] {
        let mut l = Array2::<f64>::zeros((n, n));
        let mut ok = true;

        'outer: for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
                if i == j {
                    let diag = a[[i, i]] + jitter * scale - sum;
                    if diag <= 1e-12 * scale {
                        ok = false;
                        break 'outer;
                    }
                    l[[i, j]] = diag.sqrt();
                } else {
                    l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
                }
            }
        }
        if !ok {
            continue;
        }

        // L y = b
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
            y[i] = (b[i] - sum) / l[[i, i]];
        }
        // L^T x = y
        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
            x[i] = (y[i] - sum) / l[[i, i]];
        }
        return Some(x);
    }
    None
}

/// Ordinary least squares, or ridge regression when `alpha > 0`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    pub fit_intercept: bool,
    /// L2 penalty; zero for plain least squares
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            fit_intercept: true,
            alpha: 0.0,
        }
    }

    /// Ridge regression with penalty `alpha`
    pub fn ridge(alpha: f64) -> Self {
        Self { alpha, ..Self::new() }
    }

    /// Build from catalog parameters; `ridge` selects the penalized form
    pub fn from_params(params: &Params, ridge: bool) -> Result<Self> {
        if ridge {
            params.ensure_known("Ridge", &["alpha", "fit_intercept"])?;
        } else {
            params.ensure_known("LinearRegression", &["fit_intercept"])?;
        }

        let alpha = if ridge { params.float_or("alpha", 1.0)? } else { 0.0 };
        if !(alpha >= 0.0) || !alpha.is_finite() {
            return Err(FactoryError::invalid_param("alpha", alpha, "must be a finite non-negative number"));
        }

        Ok(Self {
            fit_intercept: params.bool_or("fit_intercept", true)?,
            alpha,
            ..Self::new()
        })
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Get coefficients
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    /// Get intercept
    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_features = x.ncols();

        let (x_mean, y_mean) = if self.fit_intercept {
            (
                x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features)),
                y.mean().unwrap_or(0.0),
            )
        } else {
            (Array1::zeros(n_features), 0.0)
        };

        let x_centered = x - &x_mean;
        let y_centered = y - y_mean;

        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = cholesky_solve(&xtx, &xty).ok_or_else(|| {
            FactoryError::TrainingError("normal equations are singular".to_string())
        })?;

        self.intercept = y_mean - x_mean.dot(&coefficients);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(FactoryError::ModelNotFitted)?;
        check_features(coef.len(), x)?;
        Ok(x.dot(coef) + self.intercept)
    }

    fn task(&self) -> TaskKind {
        TaskKind::Regression
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// One binary logistic model (weights over standardized features)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryLogit {
    weights: Array1<f64>,
    bias: f64,
}

impl BinaryLogit {
    fn decision(&self, xs: &Array2<f64>) -> Array1<f64> {
        xs.dot(&self.weights) + self.bias
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// L2-regularized logistic regression trained by gradient descent.
///
/// Multi-class targets are handled one-vs-rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tol: f64,
    pub fit_intercept: bool,
    classes: Vec<f64>,
    models: Vec<BinaryLogit>,
    feature_mean: Option<Array1<f64>>,
    feature_scale: Option<Array1<f64>>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            learning_rate: 0.1,
            tol: 1e-4,
            fit_intercept: true,
            classes: Vec::new(),
            models: Vec::new(),
            feature_mean: None,
            feature_scale: None,
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        params.ensure_known(
            "LogisticRegression",
            &["C", "max_iter", "learning_rate", "tol", "fit_intercept"],
        )?;

        let model = Self {
            c: params.float_or("C", 1.0)?,
            max_iter: params.usize_or("max_iter", 1000)?,
            learning_rate: params.float_or("learning_rate", 0.1)?,
            tol: params.float_or("tol", 1e-4)?,
            fit_intercept: params.bool_or("fit_intercept", true)?,
            ..Self::new()
        };

        if !(model.c > 0.0) {
            return Err(FactoryError::invalid_param("C", model.c, "must be positive"));
        }
        if !(model.learning_rate > 0.0) {
            return Err(FactoryError::invalid_param("learning_rate", model.learning_rate, "must be positive"));
        }
        if model.max_iter == 0 {
            return Err(FactoryError::invalid_param("max_iter", 0, "must be at least 1"));
        }
        Ok(model)
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        match (&self.feature_mean, &self.feature_scale) {
            (Some(mean), Some(scale)) => (x - mean) / scale,
            _ => x.clone(),
        }
    }

    /// Gradient descent on the mean log-loss plus `||w||^2 / (2 C n)`
    fn fit_binary(&self, xs: &Array2<f64>, targets: &Array1<f64>) -> BinaryLogit {
        let n = xs.nrows() as f64;
        let penalty = 1.0 / (self.c * n);
        let mut weights = Array1::<f64>::zeros(xs.ncols());
        let mut bias = 0.0;

        for iter in 0..self.max_iter {
            let z = xs.dot(&weights) + bias;
            let errors = z.mapv(sigmoid) - targets;

            let grad_w = xs.t().dot(&errors) / n + &weights * penalty;
            let grad_b = if self.fit_intercept { errors.sum() / n } else { 0.0 };

            weights = weights - &grad_w * self.learning_rate;
            bias -= self.learning_rate * grad_b;

            let grad_norm = (grad_w.dot(&grad_w) + grad_b * grad_b).sqrt();
            if grad_norm < self.tol {
                debug!(iterations = iter + 1, "logistic regression converged");
                break;
            }
        }

        BinaryLogit { weights, bias }
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(FactoryError::TrainingError(format!(
                "logistic regression needs at least 2 classes, got {}",
                classes.len()
            )));
        }

        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        self.feature_mean = Some(mean);
        self.feature_scale = Some(scale);
        let xs = self.standardize(x);

        let positives: Vec<f64> = if classes.len() == 2 { vec![classes[1]] } else { classes.clone() };
        self.models = positives
            .iter()
            .map(|&positive| {
                let targets = y.mapv(|v| if v == positive { 1.0 } else { 0.0 });
                self.fit_binary(&xs, &targets)
            })
            .collect();
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.models.is_empty() {
            return Err(FactoryError::ModelNotFitted);
        }
        let n_features = self.feature_mean.as_ref().map(|m| m.len()).unwrap_or(0);
        check_features(n_features, x)?;
        let xs = self.standardize(x);

        if self.models.len() == 1 {
            let z = self.models[0].decision(&xs);
            return Ok(z.mapv(|v| if sigmoid(v) >= 0.5 { self.classes[1] } else { self.classes[0] }));
        }

        let scores: Vec<Array1<f64>> = self.models.iter().map(|m| m.decision(&xs)).collect();
        Ok(Array1::from_iter((0..xs.nrows()).map(|i| {
            let mut best = 0;
            for k in 1..scores.len() {
                if scores[k][i] > scores[best][i] {
                    best = k;
                }
            }
            self.classes[best]
        })))
    }

    fn task(&self) -> TaskKind {
        TaskKind::Classification
    }

    fn is_fitted(&self) -> bool {
        !self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_recovers_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-8);
        assert!((model.intercept() - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0];

        let mut ols = LinearRegression::new();
        let mut ridge = LinearRegression::ridge(10.0);
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();

        assert!(ridge.coefficients().unwrap()[0] < ols.coefficients().unwrap()[0]);
    }

    #[test]
    fn test_collinear_features_still_solve() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!((pred[3] - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_logistic_binary() {
        let x = array![[0.0], [0.5], [1.0], [1.5], [4.0], [4.5], [5.0], [5.5]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_logistic_one_vs_rest() {
        let x = array![[0.0], [0.2], [5.0], [5.2], [10.0], [10.2]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = LogisticRegression::new().with_max_iter(5000);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[0.1], [10.1]]).unwrap();
        assert_eq!(pred, array![0.0, 2.0]);
    }

    #[test]
    fn test_logistic_single_class_fails() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 1.0];
        let err = LogisticRegression::new().fit(&x, &y).unwrap_err();
        assert!(matches!(err, FactoryError::TrainingError(_)));
    }

    #[test]
    fn test_from_params_validation() {
        let ok = Params::new().with("C", 0.5).with("max_iter", 200i64);
        let model = LogisticRegression::from_params(&ok).unwrap();
        assert_eq!(model.c, 0.5);
        assert_eq!(model.max_iter, 200);

        assert!(LogisticRegression::from_params(&Params::new().with("C", 0.0)).is_err());
        assert!(LinearRegression::from_params(&Params::new().with("alpha", 1.0), false).is_err());
        assert!(LinearRegression::from_params(&Params::new().with("alpha", 1.0), true).is_ok());
    }
}
