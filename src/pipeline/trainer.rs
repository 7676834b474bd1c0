//! Model trainer stage: factory run, threshold check, bundle persistence

use crate::artifact::{ArtifactStore, TrainedModelBundle};
use crate::config::PipelineConfig;
use crate::data::Dataset;
use crate::error::{FactoryError, Result};
use crate::estimators::EstimatorRegistry;
use crate::factory::ModelFactory;
use crate::preprocessing::Preprocessor;
use crate::scoring::{ClassificationMetrics, TaskKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// What the trainer produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    /// Store key of the saved bundle
    pub trained_model_key: String,
    pub report_path: PathBuf,
    pub model_name: String,
    pub best_score: f64,
    pub test_score: f64,
    /// Held-out classification metrics; absent for regression
    pub metrics: Option<ClassificationMetrics>,
}

/// Runs the model factory and saves the selected model
pub struct ModelTrainer<'a, S: ArtifactStore> {
    config: &'a PipelineConfig,
    store: &'a S,
    registry: EstimatorRegistry,
    preprocessor: Option<Preprocessor>,
}

impl<'a, S: ArtifactStore> ModelTrainer<'a, S> {
    pub fn new(config: &'a PipelineConfig, store: &'a S) -> Self {
        Self {
            config,
            store,
            registry: EstimatorRegistry::with_builtins(),
            preprocessor: None,
        }
    }

    pub fn with_registry(mut self, registry: EstimatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Preprocessor that produced the training features, saved with the
    /// bundle
    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Train on `train`, score on `test`, save the winning bundle
    pub fn train(&self, train: &Dataset, test: &Dataset) -> Result<(ModelTrainerArtifact, TrainedModelBundle)> {
        let factory = ModelFactory::with_registry(self.config.factory.clone(), self.registry.clone());
        let run = factory.run(&train.x, &train.y, &test.x, &test.y)?;
        let best = run.best_trial();

        if best.best_score < self.config.expected_score {
            return Err(FactoryError::TrainingError(format!(
                "best model {} scored {:.4}, below the expected score {:.4}",
                best.model_name, best.best_score, self.config.expected_score
            )));
        }

        let metrics = match best.best_model.task() {
            TaskKind::Classification => {
                let y_pred = best.best_model.predict(&test.x)?;
                Some(ClassificationMetrics::compute(&test.y, &y_pred))
            }
            TaskKind::Regression => None,
        };

        let mut bundle = TrainedModelBundle::new(
            best.model_name.clone(),
            best.best_params.clone(),
            best.best_model.clone(),
            train.feature_names.clone(),
            train.label_mapping.clone(),
        )
        .with_cv_score(best.best_score);
        if let Some(m) = &metrics {
            bundle = bundle.with_metrics(m.clone());
        }
        if let Some(pre) = &self.preprocessor {
            bundle = bundle.with_preprocessor(pre.clone());
        }

        let key = self.config.trained_model_key();
        self.store.save(&key, &bundle)?;

        info!(
            model = %best.model_name,
            cv_score = best.best_score,
            test_score = best.test_score,
            key = %key,
            "Model trainer finished"
        );

        Ok((
            ModelTrainerArtifact {
                trained_model_key: key,
                report_path: run.report_path.clone(),
                model_name: best.model_name.clone(),
                best_score: best.best_score,
                test_score: best.test_score,
                metrics,
            },
            bundle,
        ))
    }
}
