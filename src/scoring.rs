//! Scoring functions and evaluation metrics
//!
//! Every [`Scorer`] is higher-is-better, so error metrics are exposed
//! negated (`neg_mean_squared_error`), as the tuner always maximizes.

use crate::error::{FactoryError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of supervised task an estimator solves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Classification,
    Regression,
}

impl TaskKind {
    /// Scorer used when the run does not name one
    pub fn default_scorer(&self) -> Scorer {
        match self {
            TaskKind::Classification => Scorer::Accuracy,
            TaskKind::Regression => Scorer::R2,
        }
    }
}

/// Named scoring function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    Accuracy,
    F1,
    Precision,
    Recall,
    R2,
    NegMeanSquaredError,
    NegMeanAbsoluteError,
}

impl Scorer {
    /// Parse a scorer name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Scorer::Accuracy),
            "f1" | "f1_score" => Ok(Scorer::F1),
            "precision" => Ok(Scorer::Precision),
            "recall" => Ok(Scorer::Recall),
            "r2" => Ok(Scorer::R2),
            "neg_mean_squared_error" | "neg_mse" => Ok(Scorer::NegMeanSquaredError),
            "neg_mean_absolute_error" | "neg_mae" => Ok(Scorer::NegMeanAbsoluteError),
            other => Err(FactoryError::ConfigError(format!("unknown scoring function '{}'", other))),
        }
    }

    /// Resolve an optional override against a task default
    pub fn resolve(name: Option<&str>, task: TaskKind) -> Result<Self> {
        match name {
            Some(n) => Self::from_name(n),
            None => Ok(task.default_scorer()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scorer::Accuracy => "accuracy",
            Scorer::F1 => "f1",
            Scorer::Precision => "precision",
            Scorer::Recall => "recall",
            Scorer::R2 => "r2",
            Scorer::NegMeanSquaredError => "neg_mean_squared_error",
            Scorer::NegMeanAbsoluteError => "neg_mean_absolute_error",
        }
    }

    /// Score predictions against ground truth
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(FactoryError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(FactoryError::ValidationError("cannot score an empty target".to_string()));
        }

        let value = match self {
            Scorer::Accuracy => accuracy(y_true, y_pred),
            Scorer::F1 => ClassificationMetrics::compute(y_true, y_pred).f1_score,
            Scorer::Precision => ClassificationMetrics::compute(y_true, y_pred).precision_score,
            Scorer::Recall => ClassificationMetrics::compute(y_true, y_pred).recall_score,
            Scorer::R2 => r2(y_true, y_pred),
            Scorer::NegMeanSquaredError => -mean_squared_error(y_true, y_pred),
            Scorer::NegMeanAbsoluteError => -mean_absolute_error(y_true, y_pred),
        };
        Ok(value)
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Held-out classification metrics of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy_score: f64,
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

impl ClassificationMetrics {
    /// Binary targets use class `1` as the positive class; more than two
    /// classes are macro-averaged.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let classes: BTreeSet<i64> = y_true
            .iter()
            .chain(y_pred.iter())
            .map(|v| v.round() as i64)
            .collect();

        let (precision, recall, f1) = if classes.len() <= 2 {
            prf_for_class(y_true, y_pred, 1)
        } else {
            let n = classes.len() as f64;
            let (p, r, f) = classes.iter().fold((0.0, 0.0, 0.0), |acc, &c| {
                let (p, r, f) = prf_for_class(y_true, y_pred, c);
                (acc.0 + p, acc.1 + r, acc.2 + f)
            });
            (p / n, r / n, f / n)
        };

        Self {
            accuracy_score: accuracy(y_true, y_pred),
            f1_score: f1,
            precision_score: precision,
            recall_score: recall,
        }
    }
}

fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Precision, recall and F1 treating `class` as positive
fn prf_for_class(y_true: &Array1<f64>, y_pred: &Array1<f64>, class: i64) -> (f64, f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;

    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let t_pos = t.round() as i64 == class;
        let p_pos = p.round() as i64 == class;
        match (t_pos, p_pos) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n
}

fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

fn r2(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    let y_mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();

    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}
