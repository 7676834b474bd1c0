//! Tabular data loading and conversion to ndarray

use crate::error::{FactoryError, Result};
use crate::preprocessing::Preprocessor;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Load a CSV or Parquet file into a DataFrame
pub fn load_data(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let df = match ext {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "parquet" => ParquetReader::new(std::fs::File::open(path)?).finish()?,
        other => {
            return Err(FactoryError::DataError(format!(
                "unsupported file format '{}' for {}",
                other,
                path.display()
            )))
        }
    };

    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded data");
    Ok(df)
}

/// Bidirectional mapping between string class labels and numeric codes.
///
/// Codes are positions in `labels`, which are sorted when fitted from data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    labels: Vec<String>,
}

impl LabelMapping {
    /// Mapping with codes assigned in the given order
    pub fn from_labels<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Sorted distinct labels of a string column
    pub fn fit(series: &Series) -> Result<Self> {
        let mut labels: Vec<String> = series
            .str()?
            .into_iter()
            .map(|v| {
                v.map(str::to_string).ok_or_else(|| {
                    FactoryError::DataError(format!("target column '{}' has missing values", series.name()))
                })
            })
            .collect::<Result<_>>()?;
        labels.sort();
        labels.dedup();
        Ok(Self { labels })
    }

    /// Mapping fitted on a string target column, `None` for numeric targets
    pub fn for_target(df: &DataFrame, target: &str) -> Result<Option<Self>> {
        let series = df
            .column(target)
            .map_err(|_| FactoryError::FeatureNotFound(target.to_string()))?;
        match series.dtype() {
            DataType::String => Ok(Some(Self::fit(series)?)),
            _ => Ok(None),
        }
    }

    pub fn encode(&self, label: &str) -> Result<f64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| i as f64)
            .ok_or_else(|| FactoryError::DataError(format!("unknown class label '{}'", label)))
    }

    pub fn decode(&self, code: f64) -> Option<&str> {
        let idx = code.round();
        if idx < 0.0 {
            return None;
        }
        self.labels.get(idx as usize).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Feature matrix and encoded target extracted from a DataFrame
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    pub label_mapping: Option<LabelMapping>,
}

impl Dataset {
    /// Use every non-target column as a feature. A string target is
    /// label-encoded with a freshly fitted mapping.
    pub fn from_frame(df: &DataFrame, target: &str) -> Result<Self> {
        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|c| *c != target)
            .map(|c| c.to_string())
            .collect();
        if feature_names.is_empty() {
            return Err(FactoryError::DataError("no feature columns besides the target".to_string()));
        }

        let label_mapping = LabelMapping::for_target(df, target)?;
        Self::from_frame_with(df, target, &feature_names, label_mapping.as_ref())
    }

    /// Extract the given features and encode the target with an existing
    /// mapping, so test data matches the training layout
    pub fn from_frame_with(
        df: &DataFrame,
        target: &str,
        feature_names: &[String],
        label_mapping: Option<&LabelMapping>,
    ) -> Result<Self> {
        let x = columns_to_array2(df, feature_names)?;
        let y = target_values(df, target, label_mapping)?;

        Ok(Self {
            x,
            y,
            feature_names: feature_names.to_vec(),
            label_mapping: label_mapping.cloned(),
        })
    }

    /// Features produced by a fitted preprocessor, target encoded with
    /// `label_mapping`
    pub fn from_frame_preprocessed(
        df: &DataFrame,
        target: &str,
        preprocessor: &Preprocessor,
        label_mapping: Option<&LabelMapping>,
    ) -> Result<Self> {
        Ok(Self {
            x: preprocessor.transform(df)?,
            y: target_values(df, target, label_mapping)?,
            feature_names: preprocessor.feature_names(),
            label_mapping: label_mapping.cloned(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }
}

/// Target column of `df` as numbers, label-encoded when it holds strings
pub fn target_values(df: &DataFrame, target: &str, mapping: Option<&LabelMapping>) -> Result<Array1<f64>> {
    let series = df
        .column(target)
        .map_err(|_| FactoryError::FeatureNotFound(target.to_string()))?;
    encode_target(series, mapping)
}

fn encode_target(series: &Series, mapping: Option<&LabelMapping>) -> Result<Array1<f64>> {
    if series.null_count() > 0 {
        return Err(FactoryError::DataError(format!(
            "target column '{}' has missing values",
            series.name()
        )));
    }

    match (series.dtype(), mapping) {
        (DataType::String, Some(mapping)) => series
            .str()?
            .into_iter()
            .map(|v| mapping.encode(v.unwrap_or_default()))
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from_vec),
        (DataType::String, None) => Err(FactoryError::DataError(format!(
            "target column '{}' holds strings but no label mapping was given",
            series.name()
        ))),
        _ => Ok(Array1::from_vec(numeric_values(series)?)),
    }
}

pub(crate) fn numeric_values(series: &Series) -> Result<Vec<f64>> {
    let dtype = series.dtype();
    if !(dtype.is_numeric() || matches!(dtype, DataType::Boolean)) {
        return Err(FactoryError::DataError(format!(
            "column '{}' has non-numeric type {}; encode it before training",
            series.name(),
            dtype
        )));
    }
    if series.null_count() > 0 {
        return Err(FactoryError::DataError(format!(
            "column '{}' has {} missing values",
            series.name(),
            series.null_count()
        )));
    }

    let as_f64 = series.cast(&DataType::Float64)?;
    Ok(as_f64.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Stack numeric columns into a row-major matrix
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| {
            let series = df
                .column(name)
                .map_err(|_| FactoryError::FeatureNotFound(name.clone()))?;
            numeric_values(series)
        })
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((df.height(), col_names.len()), |(r, c)| col_data[c][r]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_target_is_label_encoded() {
        let df = df! {
            "age" => [25.0, 40.0, 31.0],
            "wage" => [1000i64, 2000, 1500],
            "case_status" => ["Denied", "Certified", "Certified"],
        }
        .unwrap();

        let ds = Dataset::from_frame(&df, "case_status").unwrap();
        assert_eq!(ds.feature_names, vec!["age", "wage"]);
        assert_eq!(ds.y.to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(ds.x[[1, 1]], 2000.0);

        let mapping = ds.label_mapping.unwrap();
        assert_eq!(mapping.decode(0.0), Some("Certified"));
        assert_eq!(mapping.decode(1.0), Some("Denied"));
        assert_eq!(mapping.decode(2.0), None);
    }

    #[test]
    fn test_test_frame_reuses_mapping() {
        let mapping = LabelMapping::from_labels(["Certified", "Denied"]);
        let df = df! {
            "age" => [30.0],
            "case_status" => ["Denied"],
        }
        .unwrap();

        let ds = Dataset::from_frame_with(&df, "case_status", &["age".to_string()], Some(&mapping)).unwrap();
        assert_eq!(ds.y.to_vec(), vec![1.0]);
    }

    #[test]
    fn test_unknown_label_is_error() {
        let mapping = LabelMapping::from_labels(["a", "b"]);
        assert!(mapping.encode("c").is_err());
    }

    #[test]
    fn test_string_feature_is_rejected() {
        let df = df! {
            "region" => ["west", "east"],
            "label" => [0i32, 1],
        }
        .unwrap();
        let err = Dataset::from_frame(&df, "label").unwrap_err();
        assert!(matches!(err, FactoryError::DataError(_)));
    }

    #[test]
    fn test_preprocessed_frame_encodes_string_features() {
        use crate::preprocessing::{DataSchema, PreprocessingConfig};

        let df = df! {
            "region" => ["west", "east", "west"],
            "wage" => [1.0, 2.0, 3.0],
            "label" => ["no", "yes", "yes"],
        }
        .unwrap();
        let schema = DataSchema::infer(&df, "label").unwrap();
        let mut pre = Preprocessor::new(PreprocessingConfig::default());
        pre.fit(&df, &schema, "label").unwrap();
        let mapping = LabelMapping::for_target(&df, "label").unwrap();

        let ds = Dataset::from_frame_preprocessed(&df, "label", &pre, mapping.as_ref()).unwrap();
        assert_eq!(ds.feature_names, vec!["region_east", "region_west", "wage"]);
        assert_eq!(ds.x.column(0).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(ds.y.to_vec(), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_missing_target_column() {
        let df = df! { "x" => [1.0, 2.0] }.unwrap();
        let err = Dataset::from_frame(&df, "y").unwrap_err();
        assert!(matches!(err, FactoryError::FeatureNotFound(_)));
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "a,b,label\n1.0,2.0,0\n3.0,4.0,1\n").unwrap();

        let df = load_data(&path).unwrap();
        assert_eq!(df.height(), 2);
        let ds = Dataset::from_frame(&df, "label").unwrap();
        assert_eq!(ds.x.ncols(), 2);
        assert!(ds.label_mapping.is_none());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(load_data("data.xlsx"), Err(FactoryError::DataError(_))));
    }
}
