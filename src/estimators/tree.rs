//! CART decision tree for classification and regression

use super::{check_features, class_index, unique_classes, Model};
use crate::catalog::{ParamValue, Params};
use crate::error::{FactoryError, Result};
use crate::scoring::TaskKind;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    SquaredError,
}

impl Criterion {
    fn parse(name: &str, task: TaskKind) -> Result<Self> {
        match (name, task) {
            ("gini", TaskKind::Classification) => Ok(Criterion::Gini),
            ("entropy" | "log_loss", TaskKind::Classification) => Ok(Criterion::Entropy),
            ("squared_error" | "mse", TaskKind::Regression) => Ok(Criterion::SquaredError),
            _ => Err(FactoryError::invalid_param(
                "criterion",
                name,
                format!("not a {:?} criterion", task),
            )),
        }
    }
}

/// Number of features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// All features
    All,
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fixed number
    Fixed(usize),
    /// Fraction of n_features
    Fraction(f64),
}

impl MaxFeatures {
    /// Concrete feature count for a dataset width, at least 1
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Fixed(k) => *k,
            MaxFeatures::Fraction(f) => (f * n_features as f64) as usize,
        };
        n.clamp(1, n_features.max(1))
    }

    pub(crate) fn from_param(value: Option<&ParamValue>, default: MaxFeatures) -> Result<Self> {
        let Some(value) = value else {
            return Ok(default);
        };
        match value {
            ParamValue::Null => Ok(MaxFeatures::All),
            ParamValue::String(s) => match s.as_str() {
                "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                other => Err(FactoryError::invalid_param("max_features", other, "expected sqrt, log2 or a number")),
            },
            ParamValue::Int(k) if *k >= 1 => Ok(MaxFeatures::Fixed(*k as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            other => Err(FactoryError::invalid_param(
                "max_features",
                other,
                "expected a positive count or a fraction in (0, 1]",
            )),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    task: TaskKind,
    n_features: usize,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

/// Parameters accepted by [`DecisionTree::from_params`]
pub const TREE_PARAMS: &[&str] = &[
    "max_depth",
    "min_samples_split",
    "min_samples_leaf",
    "criterion",
    "max_features",
    "random_state",
];

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self::new(TaskKind::Classification, Criterion::Gini)
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self::new(TaskKind::Regression, Criterion::SquaredError)
    }

    fn new(task: TaskKind, criterion: Criterion) -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion,
            random_state: None,
            task,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Build an unfitted tree from catalog parameters
    pub fn from_params(params: &Params, task: TaskKind) -> Result<Self> {
        let name = match task {
            TaskKind::Classification => "DecisionTreeClassifier",
            TaskKind::Regression => "DecisionTreeRegressor",
        };
        params.ensure_known(name, TREE_PARAMS)?;

        let mut tree = match task {
            TaskKind::Classification => Self::new_classifier(),
            TaskKind::Regression => Self::new_regressor(),
        };
        tree.apply_params(params)?;
        Ok(tree)
    }

    /// Apply the shared tree parameters; used by forests as well
    pub(crate) fn apply_params(&mut self, params: &Params) -> Result<()> {
        self.max_depth = params.opt_usize("max_depth")?;
        self.min_samples_split = params.usize_or("min_samples_split", 2)?;
        self.min_samples_leaf = params.usize_or("min_samples_leaf", 1)?;
        self.max_features = MaxFeatures::from_param(params.get("max_features"), self.max_features)?;
        self.random_state = params.opt_u64("random_state")?;
        if let Some(name) = params.get("criterion") {
            let name = name
                .as_str()
                .ok_or_else(|| FactoryError::invalid_param("criterion", name, "expected a string"))?;
            self.criterion = Criterion::parse(name, self.task)?;
        }

        if self.max_depth == Some(0) {
            return Err(FactoryError::invalid_param("max_depth", 0, "must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(FactoryError::invalid_param(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(FactoryError::invalid_param("min_samples_leaf", 0, "must be at least 1"));
        }
        Ok(())
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit with an explicit class list, so trees grown on bootstrap samples
    /// share their forest's label set
    pub(crate) fn fit_with_classes(&mut self, x: &Array2<f64>, y: &Array1<f64>, classes: Vec<f64>) -> Result<()> {
        self.n_features = x.ncols();
        self.classes = classes;

        let targets: Vec<f64> = match self.task {
            TaskKind::Classification => y
                .iter()
                .map(|v| {
                    class_index(&self.classes, *v).map(|i| i as f64).ok_or_else(|| {
                        FactoryError::TrainingError(format!("label {} missing from class list", v))
                    })
                })
                .collect::<Result<_>>()?,
            TaskKind::Regression => y.to_vec(),
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let builder = Builder {
            x,
            targets: &targets,
            n_classes: self.classes.len(),
            criterion: self.criterion,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            n_try: self.max_features.resolve(self.n_features),
        };
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(builder.build(indices, 0, &mut rng));
        Ok(())
    }

    /// Depth of the fitted tree (a lone leaf has depth 0)
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map(depth).unwrap_or(0)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map(leaves).unwrap_or(0)
    }

    fn predict_row(&self, root: &TreeNode, x: &Array2<f64>, row: usize) -> f64 {
        let mut node = root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if x[[row, *feature_idx]] <= *threshold { left } else { right };
                }
            }
        }
    }
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let classes = match self.task {
            TaskKind::Classification => unique_classes(y),
            TaskKind::Regression => Vec::new(),
        };
        self.fit_with_classes(x, y, classes)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(FactoryError::ModelNotFitted)?;
        check_features(self.n_features, x)?;

        Ok(Array1::from_iter((0..x.nrows()).map(|row| {
            let value = self.predict_row(root, x, row);
            match self.task {
                TaskKind::Classification => self.classes[value as usize],
                TaskKind::Regression => value,
            }
        })))
    }

    fn task(&self) -> TaskKind {
        self.task
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

/// Best split found at a node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    impurity_decrease: f64,
}

/// Recursive tree growth over row indices. Classification targets are
/// class indices stored as f64.
struct Builder<'a> {
    x: &'a Array2<f64>,
    targets: &'a [f64],
    n_classes: usize,
    criterion: Criterion,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    n_try: usize,
}

impl<'a> Builder<'a> {
    fn build(&self, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> TreeNode {
        let n_samples = indices.len();
        let impurity = self.node_impurity(&indices);
        let leaf = TreeNode::Leaf { value: self.leaf_value(&indices), n_samples };

        let depth_reached = self.max_depth.map_or(false, |d| depth >= d);
        if depth_reached || n_samples < self.min_samples_split || impurity <= f64::EPSILON {
            return leaf;
        }

        let Some(split) = self.best_split(&indices, impurity, rng) else {
            return leaf;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, split.feature_idx]] <= split.threshold);

        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left: Box::new(self.build(left_idx, depth + 1, rng)),
            right: Box::new(self.build(right_idx, depth + 1, rng)),
            n_samples,
            impurity,
        }
    }

    fn best_split(&self, indices: &[usize], parent_impurity: f64, rng: &mut ChaCha8Rng) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if self.n_try < n_features {
            features.shuffle(rng);
            features.truncate(self.n_try);
            features.sort_unstable();
        }

        let mut best: Option<SplitCandidate> = None;
        for &feature in &features {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| {
                self.x[[a, feature]]
                    .partial_cmp(&self.x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            if let Some((threshold, child_impurity)) = self.scan_feature(&sorted, feature) {
                let decrease = parent_impurity - child_impurity;
                // strict comparison keeps the lowest feature index on ties
                if best.as_ref().map_or(true, |b| decrease > b.impurity_decrease + 1e-12) {
                    best = Some(SplitCandidate { feature_idx: feature, threshold, impurity_decrease: decrease });
                }
            }
        }
        best
    }

    /// Sweep one sorted feature; returns the threshold with the lowest
    /// weighted child impurity.
    fn scan_feature(&self, sorted: &[usize], feature: usize) -> Option<(f64, f64)> {
        let n = sorted.len();
        let mut best: Option<(f64, f64)> = None;

        let mut left = Stats::new(self.n_classes);
        let mut right = Stats::new(self.n_classes);
        for &i in sorted {
            right.add(self.targets[i], self.n_classes);
        }

        for pos in 0..n - 1 {
            let i = sorted[pos];
            left.add(self.targets[i], self.n_classes);
            right.remove(self.targets[i], self.n_classes);

            let value = self.x[[i, feature]];
            let next = self.x[[sorted[pos + 1], feature]];
            if next <= value {
                continue;
            }
            let n_left = pos + 1;
            if n_left < self.min_samples_leaf || n - n_left < self.min_samples_leaf {
                continue;
            }

            let weighted = (left.count * left.impurity(self.criterion) + right.count * right.impurity(self.criterion))
                / n as f64;
            if best.map_or(true, |(_, b)| weighted < b - 1e-12) {
                best = Some(((value + next) / 2.0, weighted));
            }
        }
        best
    }

    fn node_impurity(&self, indices: &[usize]) -> f64 {
        let mut stats = Stats::new(self.n_classes);
        for &i in indices {
            stats.add(self.targets[i], self.n_classes);
        }
        stats.impurity(self.criterion)
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        if self.n_classes > 0 {
            let mut counts = vec![0usize; self.n_classes];
            for &i in indices {
                counts[self.targets[i] as usize] += 1;
            }
            // first maximum wins, i.e. the smallest label
            let mut best = 0;
            for (c, &count) in counts.iter().enumerate() {
                if count > counts[best] {
                    best = c;
                }
            }
            best as f64
        } else {
            indices.iter().map(|&i| self.targets[i]).sum::<f64>() / indices.len().max(1) as f64
        }
    }
}

/// Running sufficient statistics for one side of a split
struct Stats {
    count: f64,
    class_counts: Vec<f64>,
    sum: f64,
    sum_sq: f64,
}

impl Stats {
    fn new(n_classes: usize) -> Self {
        Self { count: 0.0, class_counts: vec![0.0; n_classes], sum: 0.0, sum_sq: 0.0 }
    }

    fn add(&mut self, target: f64, n_classes: usize) {
        self.count += 1.0;
        if n_classes > 0 {
            self.class_counts[target as usize] += 1.0;
        } else {
            self.sum += target;
            self.sum_sq += target * target;
        }
    }

    fn remove(&mut self, target: f64, n_classes: usize) {
        self.count -= 1.0;
        if n_classes > 0 {
            self.class_counts[target as usize] -= 1.0;
        } else {
            self.sum -= target;
            self.sum_sq -= target * target;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count <= 0.0 {
            return 0.0;
        }
        match criterion {
            Criterion::Gini => {
                1.0 - self.class_counts.iter().map(|c| (c / self.count).powi(2)).sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|c| {
                    let p = c / self.count;
                    p * p.log2()
                })
                .sum::<f64>(),
            Criterion::SquaredError => {
                let mean = self.sum / self.count;
                (self.sum_sq / self.count - mean * mean).max(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn xor_like() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.1, 0.1],
            [0.1, 0.9],
            [0.9, 0.1],
            [0.9, 0.9]
        ];
        let y = array![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        (x, y)
    }

    #[test]
    fn test_classifier_fits_training_data() {
        let (x, y) = xor_like();
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert!(tree.get_depth() >= 2);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let (x, y) = xor_like();
        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_depth(), 1);
        assert!(tree.get_n_leaves() <= 2);
    }

    #[test]
    fn test_regressor_predicts_step() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let pred = tree.predict(&array![[2.5], [11.5]]).unwrap();
        assert_eq!(pred, array![5.0, 20.0]);
    }

    #[test]
    fn test_non_contiguous_labels_are_preserved() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![3.0, 3.0, 7.0, 7.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_from_params() {
        let params = Params::new()
            .with("max_depth", 3i64)
            .with("criterion", "entropy")
            .with("max_features", "sqrt");
        let tree = DecisionTree::from_params(&params, TaskKind::Classification).unwrap();
        assert_eq!(tree.max_depth, Some(3));
        assert_eq!(tree.criterion, Criterion::Entropy);
        assert_eq!(tree.max_features, MaxFeatures::Sqrt);
    }

    #[test]
    fn test_from_params_rejects_bad_values() {
        let bad_criterion = Params::new().with("criterion", "gini");
        assert!(DecisionTree::from_params(&bad_criterion, TaskKind::Regression).is_err());

        let bad_split = Params::new().with("min_samples_split", 1i64);
        assert!(DecisionTree::from_params(&bad_split, TaskKind::Classification).is_err());

        let unknown = Params::new().with("n_estimators", 10i64);
        assert!(matches!(
            DecisionTree::from_params(&unknown, TaskKind::Classification),
            Err(FactoryError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(10), 5);
        assert_eq!(MaxFeatures::Fixed(50).resolve(10), 10);
    }
}
