//! Persisted model bundles and the stores that hold them

use crate::catalog::Params;
use crate::data::{columns_to_array2, LabelMapping};
use crate::error::{FactoryError, Result};
use crate::estimators::Estimator;
use crate::preprocessing::Preprocessor;
use crate::scoring::ClassificationMetrics;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// A fitted estimator plus what is needed to predict from raw tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelBundle {
    pub model_name: String,
    pub params: Params,
    pub estimator: Estimator,
    /// Columns the estimator sees, after preprocessing when there is one
    pub feature_names: Vec<String>,
    /// Fitted encoder and scaler applied to raw tables before prediction
    #[serde(default)]
    pub preprocessor: Option<Preprocessor>,
    pub label_mapping: Option<LabelMapping>,
    pub metrics: Option<ClassificationMetrics>,
    /// Cross-validated score from tuning
    pub cv_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl TrainedModelBundle {
    pub fn new(
        model_name: impl Into<String>,
        params: Params,
        estimator: Estimator,
        feature_names: Vec<String>,
        label_mapping: Option<LabelMapping>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            params,
            estimator,
            feature_names,
            preprocessor: None,
            label_mapping,
            metrics: None,
            cv_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: ClassificationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cv_score(mut self, score: f64) -> Self {
        self.cv_score = Some(score);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Feature matrix of a raw table, through the preprocessor when present
    pub fn features(&self, df: &DataFrame) -> Result<Array2<f64>> {
        match &self.preprocessor {
            Some(pre) => pre.transform(df),
            None => columns_to_array2(df, &self.feature_names),
        }
    }

    /// Numeric predictions for the rows of `df`
    pub fn predict_codes(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = self.features(df)?;
        self.estimator.predict(&x)
    }

    /// Predictions rendered as labels (decoded through the label mapping
    /// when the target was categorical)
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<String>> {
        let codes = self.predict_codes(df)?;
        codes
            .iter()
            .map(|&code| match &self.label_mapping {
                Some(mapping) => mapping
                    .decode(code)
                    .map(str::to_string)
                    .ok_or_else(|| FactoryError::DataError(format!("no label for class code {}", code))),
                None => Ok(code.to_string()),
            })
            .collect()
    }
}

/// Keyed storage for model bundles
pub trait ArtifactStore {
    fn exists(&self, key: &str) -> Result<bool>;

    fn save(&self, key: &str, bundle: &TrainedModelBundle) -> Result<()>;

    fn load(&self, key: &str) -> Result<TrainedModelBundle>;
}

/// Stores bundles as JSON files under a root directory
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of a key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn save(&self, key: &str, bundle: &TrainedModelBundle) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(bundle)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), model = %bundle.model_name, "Saved model bundle");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<TrainedModelBundle> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(FactoryError::ArtifactError(format!("no artifact at {}", path.display())));
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{DecisionTree, Model};
    use ndarray::array;
    use polars::df;

    fn fitted_bundle() -> TrainedModelBundle {
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&array![[0.0], [1.0], [10.0], [11.0]], &array![0.0, 0.0, 1.0, 1.0]).unwrap();
        TrainedModelBundle::new(
            "DecisionTreeClassifier",
            Params::new(),
            Estimator::DecisionTree(tree),
            vec!["income".to_string()],
            Some(LabelMapping::from_labels(["Certified", "Denied"])),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let key = "model_trainer/trained_model/model.json";

        assert!(!store.exists(key).unwrap());
        store.save(key, &fitted_bundle()).unwrap();
        assert!(store.exists(key).unwrap());

        let loaded = store.load(key).unwrap();
        assert_eq!(loaded.model_name, "DecisionTreeClassifier");
        assert!(loaded.estimator.is_fitted());
    }

    #[test]
    fn test_load_missing_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(matches!(store.load("nope.json"), Err(FactoryError::ArtifactError(_))));
    }

    #[test]
    fn test_bundle_with_preprocessor_predicts_from_raw_strings() {
        use crate::preprocessing::{DataSchema, PreprocessingConfig};

        let train = df! {
            "continent" => ["Asia", "Asia", "Europe", "Europe"],
            "case_status" => ["Certified", "Certified", "Denied", "Denied"],
        }
        .unwrap();
        let schema = DataSchema::infer(&train, "case_status").unwrap();
        let mut pre = Preprocessor::new(PreprocessingConfig::default());
        let x = pre.fit_transform(&train, &schema, "case_status").unwrap();

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &array![0.0, 0.0, 1.0, 1.0]).unwrap();
        let bundle = TrainedModelBundle::new(
            "DecisionTreeClassifier",
            Params::new(),
            Estimator::DecisionTree(tree),
            pre.feature_names(),
            Some(LabelMapping::from_labels(["Certified", "Denied"])),
        )
        .with_preprocessor(pre);

        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        store.save("model.json", &bundle).unwrap();
        let loaded = store.load("model.json").unwrap();

        let new = df! { "continent" => ["Europe", "Asia"] }.unwrap();
        assert_eq!(loaded.predict(&new).unwrap(), vec!["Denied", "Certified"]);
    }

    #[test]
    fn test_predict_decodes_labels() {
        let df = df! {
            "income" => [0.5, 10.5],
            "unused" => [1.0, 2.0],
        }
        .unwrap();
        let labels = fitted_bundle().predict(&df).unwrap();
        assert_eq!(labels, vec!["Certified", "Denied"]);
    }
}
