//! Training pipeline around the model factory
//!
//! `load -> validate -> transform -> train -> evaluate -> promote`. Both
//! tables are checked against the column schema, then encoded and scaled by
//! a preprocessor fitted on the training table. The trainer runs the factory
//! and saves the selected bundle with that preprocessor; the evaluator
//! compares it against the deployed bundle and promotes it when accepted.

pub mod evaluation;
pub mod trainer;

pub use evaluation::{accept, EvaluationResponse, ModelEvaluator};
pub use trainer::{ModelTrainer, ModelTrainerArtifact};

use crate::artifact::ArtifactStore;
use crate::config::PipelineConfig;
use crate::data::{load_data, Dataset, LabelMapping};
use crate::error::Result;
use crate::estimators::EstimatorRegistry;
use crate::preprocessing::{DataSchema, Preprocessor};
use crate::scoring::Scorer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Everything one pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub trainer: ModelTrainerArtifact,
    pub evaluation: EvaluationResponse,
    pub promoted: bool,
}

/// End-to-end training run over train/test files
pub struct TrainingPipeline<'a, S: ArtifactStore> {
    config: PipelineConfig,
    store: &'a S,
    registry: EstimatorRegistry,
}

impl<'a, S: ArtifactStore> TrainingPipeline<'a, S> {
    pub fn new(config: PipelineConfig, store: &'a S) -> Self {
        Self {
            config,
            store,
            registry: EstimatorRegistry::with_builtins(),
        }
    }

    pub fn with_registry(mut self, registry: EstimatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load both tables, then validate, transform, train, evaluate and
    /// promote
    pub fn run(&self, train_path: impl AsRef<Path>, test_path: impl AsRef<Path>) -> Result<PipelineOutcome> {
        let train_df = load_data(train_path)?;
        let test_df = load_data(test_path)?;
        let target = self.config.target_column.as_str();
        let label_mapping = LabelMapping::for_target(&train_df, target)?;

        let schema = match &self.config.schema_path {
            Some(path) => DataSchema::from_yaml_file(path)?,
            None => DataSchema::infer(&train_df, target)?,
        };
        schema.validate(&train_df, "train")?;
        schema.validate(&test_df, "test")?;

        let mut preprocessor = Preprocessor::new(self.config.preprocessing.clone());
        preprocessor.fit(&train_df, &schema, target)?;
        let train = Dataset::from_frame_preprocessed(&train_df, target, &preprocessor, label_mapping.as_ref())?;
        let test = Dataset::from_frame_preprocessed(&test_df, target, &preprocessor, label_mapping.as_ref())?;
        info!(
            train_rows = train.n_samples(),
            test_rows = test.n_samples(),
            features = train.feature_names.len(),
            "Loaded train and test data"
        );

        let (artifact, bundle) = ModelTrainer::new(&self.config, self.store)
            .with_registry(self.registry.clone())
            .with_preprocessor(preprocessor)
            .train(&train, &test)?;

        let evaluator = ModelEvaluator::new(self.store, &self.config.production_key, &self.config.target_column)
            .with_scorer(Scorer::from_name(&self.config.evaluation_metric)?)
            .with_margin(self.config.evaluation_margin);
        let evaluation = evaluator.evaluate(&bundle, &test_df)?;

        if evaluation.is_model_accepted {
            evaluator.promote(&bundle)?;
        }

        Ok(PipelineOutcome {
            trainer: artifact,
            promoted: evaluation.is_model_accepted,
            evaluation,
        })
    }
}
