//! Module / class name resolution for catalog entries

use super::{Estimator, GaussianNB, KNeighbors, LinearRegression, LogisticRegression, RandomForest, DecisionTree};
use crate::catalog::{ModelSpec, Params};
use crate::error::{FactoryError, Result};
use crate::scoring::TaskKind;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Builds an unfitted estimator from merged parameters
pub type EstimatorConstructor = fn(&Params) -> Result<Estimator>;

#[derive(Clone, Copy)]
struct Registration {
    task: TaskKind,
    constructor: EstimatorConstructor,
}

/// A catalog reference bound to a constructor
#[derive(Clone)]
pub struct ResolvedEstimator {
    pub module: String,
    pub class_name: String,
    pub task: TaskKind,
    constructor: EstimatorConstructor,
}

impl ResolvedEstimator {
    /// Build a fresh, unfitted instance
    pub fn construct(&self, params: &Params) -> Result<Estimator> {
        (self.constructor)(params)
    }
}

impl fmt::Debug for ResolvedEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEstimator")
            .field("module", &self.module)
            .field("class_name", &self.class_name)
            .field("task", &self.task)
            .finish()
    }
}

/// Registry of constructible estimators keyed by module, then class name
#[derive(Clone, Default)]
pub struct EstimatorRegistry {
    modules: BTreeMap<String, BTreeMap<String, Registration>>,
}

const BUILTIN_MODULE: &str = "builtin";

impl EstimatorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in estimator under its sklearn-style module
    /// and under `builtin`
    pub fn with_builtins() -> Self {
        use TaskKind::{Classification, Regression};

        let builtins: [(&str, &str, TaskKind, EstimatorConstructor); 10] = [
            ("sklearn.tree", "DecisionTreeClassifier", Classification, |p| {
                Ok(Estimator::DecisionTree(DecisionTree::from_params(p, TaskKind::Classification)?))
            }),
            ("sklearn.tree", "DecisionTreeRegressor", Regression, |p| {
                Ok(Estimator::DecisionTree(DecisionTree::from_params(p, TaskKind::Regression)?))
            }),
            ("sklearn.ensemble", "RandomForestClassifier", Classification, |p| {
                Ok(Estimator::RandomForest(RandomForest::from_params(p, TaskKind::Classification)?))
            }),
            ("sklearn.ensemble", "RandomForestRegressor", Regression, |p| {
                Ok(Estimator::RandomForest(RandomForest::from_params(p, TaskKind::Regression)?))
            }),
            ("sklearn.linear_model", "LogisticRegression", Classification, |p| {
                Ok(Estimator::LogisticRegression(LogisticRegression::from_params(p)?))
            }),
            ("sklearn.linear_model", "LinearRegression", Regression, |p| {
                Ok(Estimator::LinearRegression(LinearRegression::from_params(p, false)?))
            }),
            ("sklearn.linear_model", "Ridge", Regression, |p| {
                Ok(Estimator::LinearRegression(LinearRegression::from_params(p, true)?))
            }),
            ("sklearn.neighbors", "KNeighborsClassifier", Classification, |p| {
                Ok(Estimator::KNeighbors(KNeighbors::from_params(p, TaskKind::Classification)?))
            }),
            ("sklearn.neighbors", "KNeighborsRegressor", Regression, |p| {
                Ok(Estimator::KNeighbors(KNeighbors::from_params(p, TaskKind::Regression)?))
            }),
            ("sklearn.naive_bayes", "GaussianNB", Classification, |p| {
                Ok(Estimator::GaussianNB(GaussianNB::from_params(p)?))
            }),
        ];

        let mut registry = Self::new();
        for (module, class_name, task, constructor) in builtins {
            registry.register(module, class_name, task, constructor);
            registry.register(BUILTIN_MODULE, class_name, task, constructor);
        }
        registry
    }

    /// Register (or replace) a constructor
    pub fn register(
        &mut self,
        module: impl Into<String>,
        class_name: impl Into<String>,
        task: TaskKind,
        constructor: EstimatorConstructor,
    ) -> &mut Self {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(class_name.into(), Registration { task, constructor });
        self
    }

    /// Bind a catalog entry to its constructor
    pub fn resolve(&self, spec: &ModelSpec) -> Result<ResolvedEstimator> {
        self.resolve_name(&spec.module_reference, &spec.class_name)
    }

    pub fn resolve_name(&self, module: &str, class_name: &str) -> Result<ResolvedEstimator> {
        let registration = self
            .modules
            .get(module)
            .and_then(|classes| classes.get(class_name))
            .ok_or_else(|| FactoryError::UnresolvableEstimator {
                module: module.to_string(),
                class_name: class_name.to_string(),
            })?;

        debug!(module, class_name, "resolved estimator");
        Ok(ResolvedEstimator {
            module: module.to_string(),
            class_name: class_name.to_string(),
            task: registration.task,
            constructor: registration.constructor,
        })
    }

    /// `(module, class)` pairs in sorted order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.modules
            .iter()
            .flat_map(|(m, classes)| classes.keys().map(move |c| (m.as_str(), c.as_str())))
    }

    pub fn contains(&self, module: &str, class_name: &str) -> bool {
        self.modules.get(module).map_or(false, |c| c.contains_key(class_name))
    }
}
