//! Error types for the model factory

use crate::factory::FactoryReport;
use thiserror::Error;

/// Result type alias for factory operations
pub type Result<T> = std::result::Result<T, FactoryError>;

/// Main error type for the model factory
#[derive(Error, Debug)]
pub enum FactoryError {
    /// The catalog could not be read or does not have the expected shape.
    /// Fatal: aborts a run before any fitting happens.
    #[error("Catalog format error: {0}")]
    CatalogFormat(String),

    #[error("Unresolvable estimator: class '{class_name}' not found in module '{module}'")]
    UnresolvableEstimator { module: String, class_name: String },

    #[error("All {attempted} trials failed for {model_name}: {last_error}")]
    AllTrialsFailed {
        model_name: String,
        attempted: usize,
        last_error: String,
    },

    /// No candidate reached the acceptance threshold. The full report is
    /// attached so callers can still inspect every attempt.
    #[error("No acceptable model: no candidate scored >= {base_accuracy} ({} entries evaluated)", .report.len())]
    NoAcceptableModel {
        base_accuracy: f64,
        report: Box<FactoryReport>,
    },

    #[error("Report write error for {path}: {reason}")]
    ReportWrite { path: String, reason: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FactoryError {
    /// Shorthand for an `InvalidParameter` error.
    pub fn invalid_param(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        FactoryError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error should be isolated to a single candidate rather
    /// than aborting the whole run.
    pub fn is_per_candidate(&self) -> bool {
        matches!(
            self,
            FactoryError::UnresolvableEstimator { .. } | FactoryError::AllTrialsFailed { .. }
        )
    }
}

impl From<polars::error::PolarsError> for FactoryError {
    fn from(err: polars::error::PolarsError) -> Self {
        FactoryError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for FactoryError {
    fn from(err: serde_json::Error) -> Self {
        FactoryError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for FactoryError {
    fn from(err: serde_yaml::Error) -> Self {
        FactoryError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for FactoryError {
    fn from(err: ndarray::ShapeError) -> Self {
        FactoryError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
