//! Run configuration

use crate::catalog::SearchOverrides;
use crate::error::{FactoryError, Result};
use crate::preprocessing::PreprocessingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the tuner walks a hyperparameter grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Every combination of the cross product
    Grid,
    /// A seeded subsample of `n_iter` distinct combinations
    Random { n_iter: usize },
}

impl SearchStrategy {
    pub const DEFAULT_N_ITER: usize = 10;

    /// Parse a strategy name (`grid`, `random`)
    pub fn parse(name: &str, n_iter: Option<usize>) -> std::result::Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "grid" | "gridsearchcv" => Ok(SearchStrategy::Grid),
            "random" | "randomized" | "randomizedsearchcv" => Ok(SearchStrategy::Random {
                n_iter: n_iter.unwrap_or(Self::DEFAULT_N_ITER),
            }),
            other => Err(format!("unknown search strategy '{}'", other)),
        }
    }
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Grid
    }
}

/// Configuration for a model factory run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Path to the model catalog
    pub catalog_path: PathBuf,

    /// Where the tuned-model report is written
    pub report_path: PathBuf,

    /// Minimum cross-validated score a candidate needs to be selectable
    pub base_accuracy: f64,

    /// Cross-validation folds per parameter combination
    pub cv_folds: usize,

    /// Grid or randomized search
    pub strategy: SearchStrategy,

    /// Seed for fold shuffling and random search
    pub random_state: Option<u64>,

    /// Scoring function name; `None` uses the estimator's task default
    pub scoring: Option<String>,

    /// Worker threads for evaluating grid points (1 = sequential)
    pub n_jobs: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("config/model.yaml"),
            report_path: PathBuf::from("artifact/model_trainer/all_model_report/all_tuned_model_report.yaml"),
            base_accuracy: 0.6,
            cv_folds: 5,
            strategy: SearchStrategy::Grid,
            random_state: Some(42),
            scoring: None,
            n_jobs: 1,
        }
    }
}

impl FactoryConfig {
    /// Create a configuration for a catalog and report location
    pub fn new(catalog_path: impl Into<PathBuf>, report_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            report_path: report_path.into(),
            ..Default::default()
        }
    }

    /// Load from a YAML file; missing fields take their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| FactoryError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builder method to set the acceptance threshold
    pub fn with_base_accuracy(mut self, threshold: f64) -> Self {
        self.base_accuracy = threshold;
        self
    }

    /// Builder method to set CV folds
    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Builder method to set the search strategy
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder method to set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Builder method to set scoring
    pub fn with_scoring(mut self, scoring: impl Into<String>) -> Self {
        self.scoring = Some(scoring.into());
        self
    }

    /// Builder method to enable parallel grid evaluation
    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n.max(1);
        self
    }

    /// Apply search settings declared in the catalog itself
    pub fn apply_overrides(&mut self, overrides: &SearchOverrides) {
        if let Some(strategy) = overrides.strategy {
            self.strategy = strategy;
        }
        if let Some(cv) = overrides.cv_folds {
            self.cv_folds = cv;
        }
        if let Some(seed) = overrides.random_state {
            self.random_state = Some(seed);
        }
        if let Some(scoring) = &overrides.scoring {
            self.scoring = Some(scoring.clone());
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.cv_folds < 2 {
            return Err(FactoryError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if !self.base_accuracy.is_finite() {
            return Err(FactoryError::ConfigError(
                "base_accuracy must be a finite number".to_string(),
            ));
        }
        if let SearchStrategy::Random { n_iter: 0 } = self.strategy {
            return Err(FactoryError::ConfigError(
                "random search needs n_iter >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Layout and thresholds of the surrounding training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory for all pipeline artifacts
    pub artifact_dir: PathBuf,

    /// Target column in the train/test tables
    pub target_column: String,

    /// Minimum score the selected model must reach to be saved
    pub expected_score: f64,

    /// Required improvement over the deployed model before promotion
    pub evaluation_margin: f64,

    /// Metric used when comparing against the deployed model
    pub evaluation_metric: String,

    /// Store key of the deployed model
    pub production_key: String,

    /// File name of the trained model bundle
    pub model_file_name: String,

    /// Column schema checked on both tables; inferred from the training
    /// table when unset
    pub schema_path: Option<PathBuf>,

    pub preprocessing: PreprocessingConfig,

    pub factory: FactoryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("artifact"),
            target_column: "case_status".to_string(),
            expected_score: 0.6,
            evaluation_margin: 0.02,
            evaluation_metric: "f1".to_string(),
            production_key: "model-registry/model.json".to_string(),
            model_file_name: "model.json".to_string(),
            schema_path: None,
            preprocessing: PreprocessingConfig::default(),
            factory: FactoryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| FactoryError::ConfigError(e.to_string()))?;
        config.factory.validate()?;
        Ok(config)
    }

    /// `<artifact_dir>/model_trainer`
    pub fn trainer_dir(&self) -> PathBuf {
        self.artifact_dir.join("model_trainer")
    }

    /// Store key of a freshly trained model bundle
    pub fn trained_model_key(&self) -> String {
        format!("model_trainer/trained_model/{}", self.model_file_name)
    }
}
