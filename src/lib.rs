//! Model Factory - catalog-driven model selection for tabular data
//!
//! Reads a catalog of candidate estimators with base parameters and
//! search grids, tunes every candidate with cross-validated grid or random
//! search, writes a report of all candidates and returns the best one that
//! clears a minimum score.
//!
//! # Modules
//!
//! ## Selection
//! - [`catalog`] - Catalog format, parameter values and grids
//! - [`estimators`] - Built-in estimators and the name registry
//! - [`tuning`] - Cross-validation and hyperparameter search
//! - [`factory`] - Candidate evaluation and best-model selection
//! - [`report`] - YAML report of every tuned candidate
//!
//! ## Pipeline
//! - [`data`] - CSV/Parquet loading and target encoding
//! - [`preprocessing`] - Column schema checks, categorical encoding and scaling
//! - [`scoring`] - Scoring functions and classification metrics
//! - [`artifact`] - Saved model bundles and the artifact store
//! - [`pipeline`] - Train, evaluate and promote
//!
//! ## Services
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Selection
pub mod catalog;
pub mod estimators;
pub mod tuning;
pub mod factory;
pub mod report;

// Pipeline
pub mod data;
pub mod preprocessing;
pub mod scoring;
pub mod artifact;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{FactoryError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{FactoryError, Result};

    // Configuration
    pub use crate::config::{FactoryConfig, PipelineConfig, SearchStrategy};

    // Catalog
    pub use crate::catalog::{Catalog, ModelSpec, ParamGrid, ParamValue, Params};

    // Estimators
    pub use crate::estimators::{Estimator, EstimatorRegistry, Model, ResolvedEstimator};

    // Tuning
    pub use crate::tuning::{CVStrategy, CrossValidator, TuneOutcome, Tuner};

    // Factory
    pub use crate::factory::{BestModelDetail, CandidateOutcome, FactoryReport, FactoryRun, ModelFactory, TrialResult};
    pub use crate::report::{ReportRecord, ReportWriter};

    // Pipeline
    pub use crate::artifact::{ArtifactStore, LocalArtifactStore, TrainedModelBundle};
    pub use crate::data::{load_data, Dataset, LabelMapping};
    pub use crate::preprocessing::{DataSchema, PreprocessingConfig, Preprocessor};
    pub use crate::pipeline::{TrainingPipeline, ModelEvaluator, ModelTrainer};
    pub use crate::scoring::{ClassificationMetrics, Scorer, TaskKind};
}
