//! Comparison of a freshly trained bundle against the deployed one

use crate::artifact::{ArtifactStore, TrainedModelBundle};
use crate::data::target_values;
use crate::error::Result;
use crate::scoring::Scorer;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of the deployed-vs-trained comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub trained_score: f64,
    /// `None` when nothing is deployed yet
    pub deployed_score: Option<f64>,
    pub is_model_accepted: bool,
    /// `trained_score - deployed_score` (or the trained score alone)
    pub score_difference: f64,
}

/// A trained model replaces the deployed one when nothing is deployed or
/// when it scores more than `margin` above it.
pub fn accept(trained_score: f64, deployed_score: Option<f64>, margin: f64) -> EvaluationResponse {
    let score_difference = trained_score - deployed_score.unwrap_or(0.0);
    let is_model_accepted = match deployed_score {
        None => true,
        Some(_) => score_difference > margin,
    };
    EvaluationResponse {
        trained_score,
        deployed_score,
        is_model_accepted,
        score_difference,
    }
}

/// Scores bundles on the same test table and decides on promotion
pub struct ModelEvaluator<'a, S: ArtifactStore> {
    store: &'a S,
    production_key: String,
    target_column: String,
    scorer: Scorer,
    margin: f64,
}

impl<'a, S: ArtifactStore> ModelEvaluator<'a, S> {
    pub fn new(store: &'a S, production_key: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            store,
            production_key: production_key.into(),
            target_column: target_column.into(),
            scorer: Scorer::F1,
            margin: 0.02,
        }
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Score of a bundle on `test`, preprocessing the features and encoding
    /// the target with the bundle's own fitted state
    pub fn score_bundle(&self, bundle: &TrainedModelBundle, test: &DataFrame) -> Result<f64> {
        let y_true = target_values(test, &self.target_column, bundle.label_mapping.as_ref())?;
        let y_pred = bundle.predict_codes(test)?;
        self.scorer.score(&y_true, &y_pred)
    }

    pub fn evaluate(&self, trained: &TrainedModelBundle, test: &DataFrame) -> Result<EvaluationResponse> {
        let trained_score = self.score_bundle(trained, test)?;
        let deployed_score = if self.store.exists(&self.production_key)? {
            let deployed = self.store.load(&self.production_key)?;
            Some(self.score_bundle(&deployed, test)?)
        } else {
            None
        };

        let response = accept(trained_score, deployed_score, self.margin);
        info!(
            trained_score,
            deployed_score = ?deployed_score,
            accepted = response.is_model_accepted,
            scorer = %self.scorer,
            "Model evaluation finished"
        );
        Ok(response)
    }

    /// Save `bundle` under the production key
    pub fn promote(&self, bundle: &TrainedModelBundle) -> Result<()> {
        self.store.save(&self.production_key, bundle)?;
        info!(key = %self.production_key, model = %bundle.model_name, "Promoted model");
        Ok(())
    }
}
