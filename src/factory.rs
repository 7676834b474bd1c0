//! Model factory: tune every catalog candidate and select the best
//!
//! A run parses the catalog, then for each entry in order resolves the
//! estimator, tunes it by cross-validation and scores the refitted winner on
//! held-out data. Failures are recorded per candidate and never stop the
//! loop. The full report is written before selection, so it exists even
//! when no candidate is acceptable.

use crate::catalog::{Catalog, ModelSpec, Params};
use crate::config::FactoryConfig;
use crate::error::{FactoryError, Result};
use crate::estimators::{Estimator, EstimatorRegistry};
use crate::report::ReportWriter;
use crate::tuning::Tuner;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// A successfully tuned candidate
#[derive(Debug, Clone)]
pub struct TrialResult {
    pub model_name: String,
    pub module_name: String,
    pub best_params: Params,
    /// Mean cross-validated score on the training set
    pub best_score: f64,
    pub best_model: Estimator,
    /// Score of `best_model` on the held-out test set
    pub test_score: f64,
    pub cv_std: f64,
    pub n_combinations: usize,
    pub n_failed_combinations: usize,
    pub duration_secs: f64,
}

/// Why a candidate produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnresolvableEstimator,
    AllTrialsFailed,
    /// Tuning or held-out scoring failed for another reason
    Evaluation,
}

/// Outcome of one catalog entry
#[derive(Debug, Clone)]
pub enum CandidateOutcome {
    Success(TrialResult),
    Failed {
        model_name: String,
        module_name: String,
        reason: FailureReason,
        message: String,
    },
}

impl CandidateOutcome {
    pub fn model_name(&self) -> &str {
        match self {
            CandidateOutcome::Success(t) => &t.model_name,
            CandidateOutcome::Failed { model_name, .. } => model_name,
        }
    }

    pub fn module_name(&self) -> &str {
        match self {
            CandidateOutcome::Success(t) => &t.module_name,
            CandidateOutcome::Failed { module_name, .. } => module_name,
        }
    }

    pub fn as_success(&self) -> Option<&TrialResult> {
        match self {
            CandidateOutcome::Success(t) => Some(t),
            CandidateOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.as_success().is_some()
    }

    fn failed(spec: &ModelSpec, reason: FailureReason, err: &FactoryError) -> Self {
        CandidateOutcome::Failed {
            model_name: spec.class_name.clone(),
            module_name: spec.module_reference.clone(),
            reason,
            message: err.to_string(),
        }
    }
}

/// Every candidate outcome of a run, in catalog order
#[derive(Debug, Clone, Default)]
pub struct FactoryReport {
    entries: Vec<CandidateOutcome>,
}

impl FactoryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: CandidateOutcome) {
        self.entries.push(outcome);
    }

    pub fn entries(&self) -> &[CandidateOutcome] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &TrialResult> {
        self.entries.iter().filter_map(CandidateOutcome::as_success)
    }

    pub fn n_failed(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_success()).count()
    }

    /// Position of the best acceptable entry: maximum cross-validated score
    /// among those reaching `base_accuracy`, earliest entry on ties
    pub fn best_index(&self, base_accuracy: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(trial) = entry.as_success() else { continue };
            if trial.best_score < base_accuracy {
                continue;
            }
            if best.map_or(true, |(_, score)| trial.best_score > score) {
                best = Some((idx, trial.best_score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// The best acceptable entry, if any
    pub fn best_overall(&self, base_accuracy: f64) -> Option<&TrialResult> {
        self.best_index(base_accuracy)
            .and_then(|idx| self.entries[idx].as_success())
    }
}

/// The selected model, as exposed to callers
#[derive(Debug, Clone)]
pub struct BestModelDetail {
    pub model_name: String,
    pub best_params: Params,
    pub best_score: f64,
    pub best_model: Estimator,
}

impl From<&TrialResult> for BestModelDetail {
    fn from(trial: &TrialResult) -> Self {
        Self {
            model_name: trial.model_name.clone(),
            best_params: trial.best_params.clone(),
            best_score: trial.best_score,
            best_model: trial.best_model.clone(),
        }
    }
}

/// A completed run with an acceptable winner
#[derive(Debug, Clone)]
pub struct FactoryRun {
    pub report: FactoryReport,
    pub report_path: PathBuf,
    /// Set when the report could not be written; the run still succeeds
    pub report_write_error: Option<String>,
    best_index: usize,
}

impl FactoryRun {
    /// The winning trial
    pub fn best_trial(&self) -> &TrialResult {
        match &self.report.entries[self.best_index] {
            CandidateOutcome::Success(trial) => trial,
            CandidateOutcome::Failed { .. } => unreachable!("best index always points at a success"),
        }
    }

    pub fn best(&self) -> BestModelDetail {
        BestModelDetail::from(self.best_trial())
    }
}

/// Tunes every catalog candidate and picks the best one
#[derive(Clone)]
pub struct ModelFactory {
    config: FactoryConfig,
    registry: EstimatorRegistry,
}

impl ModelFactory {
    /// Factory over the built-in estimators
    pub fn new(config: FactoryConfig) -> Self {
        Self::with_registry(config, EstimatorRegistry::with_builtins())
    }

    pub fn with_registry(config: FactoryConfig, registry: EstimatorRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &EstimatorRegistry {
        &self.registry
    }

    /// Run over the configured catalog file
    pub fn run(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<FactoryRun> {
        let catalog = Catalog::from_path(&self.config.catalog_path)?;
        self.run_catalog(&catalog, x_train, y_train, x_test, y_test)
    }

    /// Best model of a run over the configured catalog
    pub fn get_best_model(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<BestModelDetail> {
        Ok(self.run(x_train, y_train, x_test, y_test)?.best())
    }

    /// Run over an already parsed catalog
    pub fn run_catalog(
        &self,
        catalog: &Catalog,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<FactoryRun> {
        if catalog.is_empty() {
            return Err(FactoryError::CatalogFormat("catalog has no entries".to_string()));
        }

        let mut config = self.config.clone();
        config.apply_overrides(&catalog.search);
        config.validate()?;
        let tuner = Tuner::from_config(&config)?;
        if config.scoring.is_none() && self.mixes_task_kinds(catalog) {
            warn!(
                "Catalog mixes classification and regression estimators; their default scores \
                 (accuracy and R²) are not comparable, set `scoring` to rank them together"
            );
        }

        info!(
            candidates = catalog.len(),
            cv_folds = config.cv_folds,
            base_accuracy = config.base_accuracy,
            "Starting model factory run"
        );

        let mut report = FactoryReport::new();
        for spec in catalog.iter() {
            let outcome = self.evaluate_candidate(&tuner, spec, x_train, y_train, x_test, y_test);
            report.push(outcome);
        }

        let report_write_error = match ReportWriter::write(&config.report_path, &report) {
            Ok(()) => None,
            Err(e) => {
                warn!(path = %config.report_path.display(), error = %e, "Failed to write model report");
                Some(e.to_string())
            }
        };

        let Some(best_index) = report.best_index(config.base_accuracy) else {
            warn!(
                base_accuracy = config.base_accuracy,
                candidates = report.len(),
                failed = report.n_failed(),
                "No candidate reached the base accuracy"
            );
            return Err(FactoryError::NoAcceptableModel {
                base_accuracy: config.base_accuracy,
                report: Box::new(report),
            });
        };

        let run = FactoryRun {
            report,
            report_path: config.report_path.clone(),
            report_write_error,
            best_index,
        };
        let best = run.best_trial();
        info!(
            model = %best.model_name,
            params = %best.best_params,
            score = best.best_score,
            test_score = best.test_score,
            "Selected best model"
        );
        Ok(run)
    }

    /// Whether the resolvable entries of `catalog` span both task kinds
    pub fn mixes_task_kinds(&self, catalog: &Catalog) -> bool {
        let mut tasks = catalog
            .iter()
            .filter_map(|spec| self.registry.resolve(spec).ok())
            .map(|resolved| resolved.task);
        match tasks.next() {
            Some(first) => tasks.any(|t| t != first),
            None => false,
        }
    }

    fn evaluate_candidate(
        &self,
        tuner: &Tuner,
        spec: &ModelSpec,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> CandidateOutcome {
        info!(key = %spec.key, module = %spec.module_reference, model = %spec.class_name, "Evaluating candidate");

        let resolved = match self.registry.resolve(spec) {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %spec.class_name, error = %e, "Candidate could not be resolved");
                return CandidateOutcome::failed(spec, FailureReason::UnresolvableEstimator, &e);
            }
        };

        let outcome = match tuner.tune(&resolved, &spec.base_params, &spec.search_grid, x_train, y_train) {
            Ok(o) => o,
            Err(e) => {
                let reason = match &e {
                    FactoryError::AllTrialsFailed { .. } => FailureReason::AllTrialsFailed,
                    _ => FailureReason::Evaluation,
                };
                warn!(model = %spec.class_name, error = %e, "Candidate tuning failed");
                return CandidateOutcome::failed(spec, reason, &e);
            }
        };

        let scorer = tuner.scorer_for(&resolved);
        let test_score = match outcome.best_model.score(x_test, y_test, scorer) {
            Ok(s) => s,
            Err(e) => {
                warn!(model = %spec.class_name, error = %e, "Held-out scoring failed");
                return CandidateOutcome::failed(spec, FailureReason::Evaluation, &e);
            }
        };

        info!(
            model = %spec.class_name,
            cv_score = outcome.best_score,
            test_score,
            "Candidate finished"
        );

        CandidateOutcome::Success(TrialResult {
            model_name: spec.class_name.clone(),
            module_name: spec.module_reference.clone(),
            best_params: outcome.best_params,
            best_score: outcome.best_score,
            best_model: outcome.best_model,
            test_score,
            cv_std: outcome.cv_std,
            n_combinations: outcome.n_evaluated,
            n_failed_combinations: outcome.n_failed,
            duration_secs: outcome.duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::GaussianNB;

    fn trial(name: &str, score: f64) -> CandidateOutcome {
        CandidateOutcome::Success(TrialResult {
            model_name: name.to_string(),
            module_name: "builtin".to_string(),
            best_params: Params::new(),
            best_score: score,
            best_model: Estimator::GaussianNB(GaussianNB::new()),
            test_score: score,
            cv_std: 0.0,
            n_combinations: 1,
            n_failed_combinations: 0,
            duration_secs: 0.0,
        })
    }

    fn failed(name: &str) -> CandidateOutcome {
        CandidateOutcome::Failed {
            model_name: name.to_string(),
            module_name: "builtin".to_string(),
            reason: FailureReason::UnresolvableEstimator,
            message: "not found".to_string(),
        }
    }

    #[test]
    fn test_best_overall_filters_by_threshold() {
        let mut report = FactoryReport::new();
        report.push(trial("a", 0.55));
        report.push(failed("b"));
        report.push(trial("c", 0.7));
        report.push(trial("d", 0.65));

        assert_eq!(report.best_overall(0.6).unwrap().model_name, "c");
        assert!(report.best_overall(0.9).is_none());
        assert_eq!(report.n_failed(), 1);
        assert_eq!(report.successes().count(), 3);
    }

    #[test]
    fn test_ties_go_to_earliest_entry() {
        let mut report = FactoryReport::new();
        report.push(trial("first", 0.8));
        report.push(trial("second", 0.8));
        assert_eq!(report.best_index(0.5), Some(0));
    }

    #[test]
    fn test_mixed_task_kinds_detected() {
        let factory = ModelFactory::new(FactoryConfig::default());
        let mixed = Catalog::from_yaml_str(
            "- module: builtin\n  class: GaussianNB\n- module: sklearn.linear_model\n  class: Ridge\n",
        )
        .unwrap();
        assert!(factory.mixes_task_kinds(&mixed));

        // unresolvable entries do not count
        let single = Catalog::from_yaml_str(
            "- module: builtin\n  class: GaussianNB\n- module: xgboost\n  class: XGBRegressor\n- module: sklearn.neighbors\n  class: KNeighborsClassifier\n",
        )
        .unwrap();
        assert!(!factory.mixes_task_kinds(&single));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut report = FactoryReport::new();
        report.push(trial("exact", 0.6));
        assert_eq!(report.best_overall(0.6).unwrap().model_name, "exact");
    }
}
