//! Gaussian Naive Bayes for continuous features

use super::{check_features, unique_classes, Model};
use crate::catalog::Params;
use crate::error::{FactoryError, Result};
use crate::scoring::TaskKind;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian Naive Bayes classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNB {
    /// Per-class feature means, one row per class
    means: Option<Array2<f64>>,
    /// Per-class feature variances (smoothed)
    variances: Option<Array2<f64>>,
    log_priors: Vec<f64>,
    classes: Vec<f64>,
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for GaussianNB {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNB {
    pub fn new() -> Self {
        Self {
            means: None,
            variances: None,
            log_priors: Vec::new(),
            classes: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        params.ensure_known("GaussianNB", &["var_smoothing"])?;
        let var_smoothing = params.float_or("var_smoothing", 1e-9)?;
        if !(var_smoothing >= 0.0) {
            return Err(FactoryError::invalid_param("var_smoothing", var_smoothing, "must be non-negative"));
        }
        Ok(Self::new().with_var_smoothing(var_smoothing))
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    fn joint_log_likelihood(&self, means: &Array2<f64>, variances: &Array2<f64>, row: ArrayView1<f64>) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let ll: f64 = row
                    .iter()
                    .zip(means.row(c).iter().zip(variances.row(c).iter()))
                    .map(|(x, (mean, var))| -0.5 * (2.0 * PI * var).ln() - (x - mean).powi(2) / (2.0 * var))
                    .sum();
                self.log_priors[c] + ll
            })
            .collect()
    }
}

impl Model for GaussianNB {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();
        let classes = unique_classes(y);

        let epsilon = self.var_smoothing
            * x.var_axis(Axis(0), 0.0).iter().cloned().fold(0.0_f64, f64::max);

        let mut means = Array2::<f64>::zeros((classes.len(), n_features));
        let mut variances = Array2::<f64>::zeros((classes.len(), n_features));
        let mut log_priors = Vec::with_capacity(classes.len());

        for (c, &label) in classes.iter().enumerate() {
            let rows: Vec<usize> = y.iter().enumerate().filter(|(_, &v)| v == label).map(|(i, _)| i).collect();
            let x_c = x.select(Axis(0), &rows);

            let mean = x_c.mean_axis(Axis(0)).ok_or_else(|| {
                FactoryError::TrainingError(format!("class {} has no samples", label))
            })?;
            let var = x_c.var_axis(Axis(0), 0.0) + epsilon;
            means.row_mut(c).assign(&mean);
            variances.row_mut(c).assign(&var);
            log_priors.push((rows.len() as f64 / n_samples).ln());
        }

        if variances.iter().any(|v| *v <= 0.0) {
            return Err(FactoryError::TrainingError(
                "zero feature variance; increase var_smoothing".to_string(),
            ));
        }

        self.means = Some(means);
        self.variances = Some(variances);
        self.log_priors = log_priors;
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (means, variances) = match (&self.means, &self.variances) {
            (Some(m), Some(v)) => (m, v),
            _ => return Err(FactoryError::ModelNotFitted),
        };
        check_features(means.ncols(), x)?;

        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            let jll = self.joint_log_likelihood(means, variances, row);
            let mut best = 0;
            for (c, &v) in jll.iter().enumerate() {
                if v > jll[best] {
                    best = c;
                }
            }
            self.classes[best]
        })))
    }

    fn task(&self) -> TaskKind {
        TaskKind::Classification
    }

    fn is_fitted(&self) -> bool {
        self.means.is_some()
    }
}
