//! K-nearest neighbors classifier and regressor

use super::{check_features, class_index, unique_classes, Model};
use crate::catalog::Params;
use crate::error::{FactoryError, Result};
use crate::scoring::TaskKind;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// How neighbors are weighted in the vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    Uniform,
    /// Inverse distance; exact matches take the whole vote
    Distance,
}

/// Brute-force k-nearest neighbors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNeighbors {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    /// Minkowski power: 1 = manhattan, 2 = euclidean
    pub p: u32,
    task: TaskKind,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl KNeighbors {
    pub fn new_classifier(n_neighbors: usize) -> Self {
        Self::new(TaskKind::Classification, n_neighbors)
    }

    pub fn new_regressor(n_neighbors: usize) -> Self {
        Self::new(TaskKind::Regression, n_neighbors)
    }

    fn new(task: TaskKind, n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            weights: WeightScheme::Uniform,
            p: 2,
            task,
            x_train: None,
            y_train: None,
            classes: Vec::new(),
        }
    }

    pub fn from_params(params: &Params, task: TaskKind) -> Result<Self> {
        let name = match task {
            TaskKind::Classification => "KNeighborsClassifier",
            TaskKind::Regression => "KNeighborsRegressor",
        };
        params.ensure_known(name, &["n_neighbors", "weights", "p"])?;

        let n_neighbors = params.usize_or("n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(FactoryError::invalid_param("n_neighbors", 0, "must be at least 1"));
        }
        let weights = match params.str_or("weights", "uniform")? {
            "uniform" => WeightScheme::Uniform,
            "distance" => WeightScheme::Distance,
            other => {
                return Err(FactoryError::invalid_param("weights", other, "expected uniform or distance"))
            }
        };
        let p = match params.usize_or("p", 2)? {
            1 => 1,
            2 => 2,
            other => return Err(FactoryError::invalid_param("p", other, "only 1 and 2 are supported")),
        };

        Ok(Self { weights, p, ..Self::new(task, n_neighbors) })
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    /// Number of samples memorized by the last fit
    pub fn n_samples_fit(&self) -> usize {
        self.x_train.as_ref().map(|x| x.nrows()).unwrap_or(0)
    }

    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match self.p {
            1 => diffs.sum(),
            _ => diffs.map(|d| d * d).sum::<f64>().sqrt(),
        }
    }

    /// Indices and distances of the k nearest training rows; ties in
    /// distance resolve to the lower training index.
    fn neighbors(&self, x_train: &Array2<f64>, row: ArrayView1<f64>) -> Vec<(usize, f64)> {
        let mut dists: Vec<(usize, f64)> = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train_row)| (i, self.distance(row, train_row)))
            .collect();
        dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        dists.truncate(self.n_neighbors);
        dists
    }

    fn vote_weights(&self, neighbors: &[(usize, f64)]) -> Vec<f64> {
        match self.weights {
            WeightScheme::Uniform => vec![1.0; neighbors.len()],
            WeightScheme::Distance => {
                if neighbors.iter().any(|(_, d)| *d == 0.0) {
                    neighbors.iter().map(|(_, d)| if *d == 0.0 { 1.0 } else { 0.0 }).collect()
                } else {
                    neighbors.iter().map(|(_, d)| 1.0 / d).collect()
                }
            }
        }
    }
}

impl Model for KNeighbors {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.n_neighbors > x.nrows() {
            return Err(FactoryError::TrainingError(format!(
                "n_neighbors = {} exceeds n_samples = {}",
                self.n_neighbors,
                x.nrows()
            )));
        }
        if self.task == TaskKind::Classification {
            self.classes = unique_classes(y);
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(FactoryError::ModelNotFitted),
        };
        check_features(x_train.ncols(), x)?;

        let predictions = x.rows().into_iter().map(|row| {
            let neighbors = self.neighbors(x_train, row);
            let weights = self.vote_weights(&neighbors);

            match self.task {
                TaskKind::Classification => {
                    let mut votes = vec![0.0; self.classes.len()];
                    for ((idx, _), w) in neighbors.iter().zip(&weights) {
                        if let Some(c) = class_index(&self.classes, y_train[*idx]) {
                            votes[c] += w;
                        }
                    }
                    let mut best = 0;
                    for (c, &v) in votes.iter().enumerate() {
                        if v > votes[best] {
                            best = c;
                        }
                    }
                    self.classes[best]
                }
                TaskKind::Regression => {
                    let total: f64 = weights.iter().sum();
                    neighbors
                        .iter()
                        .zip(&weights)
                        .map(|((idx, _), w)| y_train[*idx] * w)
                        .sum::<f64>()
                        / total
                }
            }
        });

        Ok(Array1::from_iter(predictions))
    }

    fn task(&self) -> TaskKind {
        self.task
    }

    fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_majority_vote() {
        let x = array![[0.0], [0.1], [0.2], [5.0], [5.1]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0];
        let mut knn = KNeighbors::new_classifier(3);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.05], [5.05]]).unwrap(), array![0.0, 1.0]);
    }

    #[test]
    fn test_regressor_distance_weighting() {
        let x = array![[0.0], [1.0], [10.0]];
        let y = array![0.0, 10.0, 100.0];
        let mut knn = KNeighbors::new_regressor(2).with_weights(WeightScheme::Distance);
        knn.fit(&x, &y).unwrap();

        // exact match takes the whole vote
        assert_eq!(knn.predict(&array![[1.0]]).unwrap()[0], 10.0);
        // 0.25 from 0.0 and 0.75 from 1.0
        let pred = knn.predict(&array![[0.25]]).unwrap()[0];
        assert!((pred - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_too_many_neighbors_fails_fit() {
        let mut knn = KNeighbors::new_classifier(10);
        let err = knn.fit(&array![[0.0], [1.0]], &array![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, FactoryError::TrainingError(_)));
    }

    #[test]
    fn test_from_params() {
        let params = Params::new().with("n_neighbors", 3i64).with("weights", "distance").with("p", 1i64);
        let knn = KNeighbors::from_params(&params, TaskKind::Classification).unwrap();
        assert_eq!(knn.n_neighbors, 3);
        assert_eq!(knn.weights, WeightScheme::Distance);
        assert_eq!(knn.p, 1);

        assert!(KNeighbors::from_params(&Params::new().with("p", 3i64), TaskKind::Regression).is_err());
    }
}
