//! YAML report of every tuned candidate

use crate::catalog::Params;
use crate::error::{FactoryError, Result};
use crate::factory::{CandidateOutcome, FactoryReport, FailureReason};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Outcome label of a report record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    UnresolvableEstimator,
    AllTrialsFailed,
    EvaluationFailed,
}

impl From<FailureReason> for RecordStatus {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::UnresolvableEstimator => RecordStatus::UnresolvableEstimator,
            FailureReason::AllTrialsFailed => RecordStatus::AllTrialsFailed,
            FailureReason::Evaluation => RecordStatus::EvaluationFailed,
        }
    }
}

/// One serialized candidate; the fitted estimator is never written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub model_name: String,
    #[serde(default)]
    pub module_name: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub best_params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CandidateOutcome> for ReportRecord {
    fn from(outcome: &CandidateOutcome) -> Self {
        match outcome {
            CandidateOutcome::Success(trial) => ReportRecord {
                model_name: trial.model_name.clone(),
                module_name: trial.module_name.clone(),
                status: RecordStatus::Success,
                best_params: trial.best_params.clone(),
                best_score: Some(trial.best_score),
                test_score: Some(trial.test_score),
                error: None,
            },
            CandidateOutcome::Failed { model_name, module_name, reason, message } => ReportRecord {
                model_name: model_name.clone(),
                module_name: module_name.clone(),
                status: (*reason).into(),
                best_params: Params::new(),
                best_score: None,
                test_score: None,
                error: Some(message.clone()),
            },
        }
    }
}

/// Writes and reads factory reports
pub struct ReportWriter;

impl ReportWriter {
    /// Serialize `report` to `path`, creating parent directories
    pub fn write(path: impl AsRef<Path>, report: &FactoryReport) -> Result<()> {
        let path = path.as_ref();
        let write_error = |reason: String| FactoryError::ReportWrite {
            path: path.display().to_string(),
            reason,
        };

        let records: Vec<ReportRecord> = report.entries().iter().map(ReportRecord::from).collect();
        let yaml = serde_yaml::to_string(&records).map_err(|e| write_error(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        std::fs::write(path, yaml).map_err(|e| write_error(e.to_string()))?;

        info!(path = %path.display(), entries = records.len(), "Model report written");
        Ok(())
    }

    /// Read records back from a written report
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<ReportRecord>> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamValue;
    use crate::estimators::{Estimator, GaussianNB};
    use crate::factory::TrialResult;

    fn sample_report() -> FactoryReport {
        let mut report = FactoryReport::new();
        report.push(CandidateOutcome::Success(TrialResult {
            model_name: "GaussianNB".to_string(),
            module_name: "sklearn.naive_bayes".to_string(),
            best_params: Params::new().with("var_smoothing", 1e-9),
            best_score: 0.8125,
            best_model: Estimator::GaussianNB(GaussianNB::new()),
            test_score: 0.79,
            cv_std: 0.01,
            n_combinations: 1,
            n_failed_combinations: 0,
            duration_secs: 0.1,
        }));
        report.push(CandidateOutcome::Failed {
            model_name: "XGBClassifier".to_string(),
            module_name: "xgboost".to_string(),
            reason: FailureReason::UnresolvableEstimator,
            message: "not found".to_string(),
        });
        report
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_trainer/all_model_report/report.yaml");
        ReportWriter::write(&path, &sample_report()).unwrap();

        let records = ReportWriter::read(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(records[0].best_score, Some(0.8125));
        assert_eq!(records[1].status, RecordStatus::UnresolvableEstimator);
        assert!(records[1].best_score.is_none());
    }

    #[test]
    fn test_round_trip_preserves_params() {
        let params = Params::new()
            .with("n_estimators", 50i64)
            .with("max_features", 0.5)
            .with("criterion", "entropy")
            .with("max_depth", ParamValue::Null)
            .with("hidden_layer_sizes", ParamValue::List(vec![ParamValue::Int(100), ParamValue::Int(50)]));
        let mut report = FactoryReport::new();
        report.push(CandidateOutcome::Success(TrialResult {
            model_name: "RandomForestClassifier".to_string(),
            module_name: "sklearn.ensemble".to_string(),
            best_params: params.clone(),
            best_score: 0.734375,
            best_model: Estimator::GaussianNB(GaussianNB::new()),
            test_score: 0.7,
            cv_std: 0.02,
            n_combinations: 4,
            n_failed_combinations: 0,
            duration_secs: 1.5,
        }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.yaml");
        ReportWriter::write(&path, &report).unwrap();
        let records = ReportWriter::read(&path).unwrap();

        assert_eq!(records[0].model_name, "RandomForestClassifier");
        assert_eq!(records[0].best_params, params);
        assert_eq!(records[0].best_score, Some(0.734375));
        let keys: Vec<&str> = records[0].best_params.keys().collect();
        assert_eq!(keys, vec!["n_estimators", "max_features", "criterion", "max_depth", "hidden_layer_sizes"]);
    }

    #[test]
    fn test_unwritable_path_is_report_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let err = ReportWriter::write(blocker.join("report.yaml"), &sample_report()).unwrap_err();
        assert!(matches!(err, FactoryError::ReportWrite { .. }));
    }
}
