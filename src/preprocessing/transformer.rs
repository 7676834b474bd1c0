//! Fitted feature transform: categorical encoding plus numeric scaling

use super::{ColumnKind, DataSchema, EncoderType, PreprocessingConfig, ScalerType};
use crate::data::numeric_values;
use crate::error::{FactoryError, Result};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Parameters for one scaled column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScaledColumn {
    name: String,
    center: f64, // mean or min
    scale: f64,  // std or range
}

/// Sorted categories seen for one column during fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EncodedColumn {
    name: String,
    categories: Vec<String>,
}

/// Turns raw feature columns into the matrix the estimators see.
///
/// Output layout is every categorical column first (one block per column,
/// in schema order), then every numerical column. The fitted state is
/// serialized with the model bundle so prediction repeats it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    config: PreprocessingConfig,
    categorical: Vec<EncodedColumn>,
    numerical: Vec<ScaledColumn>,
    is_fitted: bool,
}

impl Preprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self {
            config,
            categorical: Vec::new(),
            numerical: Vec::new(),
            is_fitted: false,
        }
    }

    /// Learn categories and scaling parameters from the feature columns
    /// `schema` names for `df`
    pub fn fit(&mut self, df: &DataFrame, schema: &DataSchema, target: &str) -> Result<&mut Self> {
        let categorical = schema.features(ColumnKind::Categorical, target);
        let numerical = schema.features(ColumnKind::Numerical, target);
        if categorical.is_empty() && numerical.is_empty() {
            return Err(FactoryError::DataError("no feature columns besides the target".to_string()));
        }
        if df.height() == 0 {
            return Err(FactoryError::DataError("cannot fit preprocessing on an empty table".to_string()));
        }

        self.categorical = categorical
            .into_iter()
            .map(|name| {
                let mut categories = string_values(df, &name)?;
                categories.sort();
                categories.dedup();
                Ok(EncodedColumn { name, categories })
            })
            .collect::<Result<_>>()?;

        self.numerical = numerical
            .into_iter()
            .map(|name| {
                let values = column_numeric(df, &name)?;
                let (center, scale) = self.config.scaler.params(&values);
                Ok(ScaledColumn { name, center, scale })
            })
            .collect::<Result<_>>()?;

        self.is_fitted = true;
        debug!(
            categorical = self.categorical.len(),
            numerical = self.numerical.len(),
            features_out = self.n_features_out(),
            "Fitted preprocessor"
        );
        Ok(self)
    }

    /// Encoded and scaled feature matrix for `df`
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(FactoryError::ModelNotFitted);
        }

        let mut blocks: Vec<Vec<f64>> = Vec::with_capacity(self.n_features_out());
        let mut unseen = 0usize;

        for column in &self.categorical {
            let values = string_values(df, &column.name)?;
            let codes: Vec<Option<usize>> = values
                .iter()
                .map(|v| column.categories.binary_search(v).ok())
                .collect();
            unseen += codes.iter().filter(|c| c.is_none()).count();

            match self.config.encoder {
                EncoderType::OneHot => {
                    for idx in 0..column.categories.len() {
                        blocks.push(codes.iter().map(|c| if *c == Some(idx) { 1.0 } else { 0.0 }).collect());
                    }
                }
                EncoderType::Ordinal => {
                    blocks.push(codes.iter().map(|c| c.map_or(-1.0, |i| i as f64)).collect());
                }
            }
        }

        for column in &self.numerical {
            let values = column_numeric(df, &column.name)?;
            blocks.push(values.iter().map(|v| (v - column.center) / column.scale).collect());
        }

        if unseen > 0 {
            warn!(count = unseen, "Categories not seen during fit");
        }
        Ok(Array2::from_shape_fn((df.height(), blocks.len()), |(r, c)| blocks[c][r]))
    }

    pub fn fit_transform(&mut self, df: &DataFrame, schema: &DataSchema, target: &str) -> Result<Array2<f64>> {
        self.fit(df, schema, target)?;
        self.transform(df)
    }

    /// Raw columns read by `transform`
    pub fn input_columns(&self) -> Vec<String> {
        self.categorical
            .iter()
            .map(|c| c.name.clone())
            .chain(self.numerical.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// Names of the output columns, `<column>_<category>` for one-hot blocks
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_features_out());
        for column in &self.categorical {
            match self.config.encoder {
                EncoderType::OneHot => {
                    names.extend(column.categories.iter().map(|cat| format!("{}_{}", column.name, cat)))
                }
                EncoderType::Ordinal => names.push(column.name.clone()),
            }
        }
        names.extend(self.numerical.iter().map(|c| c.name.clone()));
        names
    }

    pub fn n_features_out(&self) -> usize {
        let encoded: usize = match self.config.encoder {
            EncoderType::OneHot => self.categorical.iter().map(|c| c.categories.len()).sum(),
            EncoderType::Ordinal => self.categorical.len(),
        };
        encoded + self.numerical.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }
}

impl ScalerType {
    /// `(center, scale)` for a column; a constant column keeps scale 1
    fn params(&self, values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let nonzero = |s: f64| if s == 0.0 || !s.is_finite() { 1.0 } else { s };
        match self {
            ScalerType::Standard => {
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                (mean, nonzero(var.sqrt()))
            }
            ScalerType::MinMax => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (min, nonzero(max - min))
            }
            ScalerType::None => (0.0, 1.0),
        }
    }
}

fn column_numeric(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .map_err(|_| FactoryError::FeatureNotFound(name.to_string()))?;
    numeric_values(series)
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)
        .map_err(|_| FactoryError::FeatureNotFound(name.to_string()))?;
    if series.dtype() != &DataType::String {
        return Err(FactoryError::DataError(format!(
            "categorical column '{}' has type {}",
            name,
            series.dtype()
        )));
    }
    series
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::to_string)
                .ok_or_else(|| FactoryError::DataError(format!("column '{}' has missing values", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df! {
            "continent" => ["Europe", "Asia", "Asia", "Africa"],
            "wage" => [1.0, 2.0, 3.0, 4.0],
            "has_job_experience" => [true, false, true, true],
            "case_status" => ["Certified", "Denied", "Certified", "Denied"],
        }
        .unwrap()
    }

    fn fitted(config: PreprocessingConfig) -> Preprocessor {
        let df = frame();
        let schema = DataSchema::infer(&df, "case_status").unwrap();
        let mut pre = Preprocessor::new(config);
        pre.fit(&df, &schema, "case_status").unwrap();
        pre
    }

    #[test]
    fn test_one_hot_then_standard_scaling() {
        let pre = fitted(PreprocessingConfig::default());
        assert_eq!(
            pre.feature_names(),
            vec!["continent_Africa", "continent_Asia", "continent_Europe", "wage", "has_job_experience"]
        );

        let x = pre.transform(&frame()).unwrap();
        assert_eq!(x.dim(), (4, 5));
        assert_eq!(x.row(0).to_vec()[..3], [0.0, 0.0, 1.0]);
        assert_eq!(x.row(3).to_vec()[..3], [1.0, 0.0, 0.0]);

        let wage = x.column(3);
        assert!(wage.sum().abs() < 1e-12);
        let var = wage.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ordinal_encoding_and_unseen_category() {
        let pre = fitted(
            PreprocessingConfig::default()
                .with_encoder(EncoderType::Ordinal)
                .with_scaler(ScalerType::None),
        );
        assert_eq!(pre.feature_names(), vec!["continent", "wage", "has_job_experience"]);

        let new = df! {
            "continent" => ["Asia", "Oceania"],
            "wage" => [7.5, 0.0],
            "has_job_experience" => [false, true],
        }
        .unwrap();
        let x = pre.transform(&new).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![1.0, 7.5, 0.0]);
        assert_eq!(x.row(1).to_vec(), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unseen_category_one_hot_is_all_zero() {
        let pre = fitted(PreprocessingConfig::default());
        let new = df! {
            "continent" => ["Oceania"],
            "wage" => [2.5],
            "has_job_experience" => [true],
        }
        .unwrap();
        let x = pre.transform(&new).unwrap();
        assert_eq!(x.row(0).to_vec()[..3], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_minmax_and_constant_column() {
        let df = df! {
            "a" => [2.0, 4.0, 6.0],
            "flat" => [5.0, 5.0, 5.0],
            "y" => [0i32, 1, 0],
        }
        .unwrap();
        let schema = DataSchema::infer(&df, "y").unwrap();
        let mut pre = Preprocessor::new(PreprocessingConfig::default().with_scaler(ScalerType::MinMax));
        let x = pre.fit_transform(&df, &schema, "y").unwrap();

        assert_eq!(x.column(0).to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(x.column(1).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_input_column() {
        let pre = fitted(PreprocessingConfig::default());
        let df = df! { "wage" => [1.0], "has_job_experience" => [true] }.unwrap();
        assert!(matches!(pre.transform(&df), Err(FactoryError::FeatureNotFound(c)) if c == "continent"));
    }

    #[test]
    fn test_transform_before_fit() {
        let pre = Preprocessor::new(PreprocessingConfig::default());
        assert!(matches!(pre.transform(&frame()), Err(FactoryError::ModelNotFitted)));
    }

    #[test]
    fn test_serialized_state_transforms_identically() {
        let pre = fitted(PreprocessingConfig::default());
        let json = serde_json::to_string(&pre).unwrap();
        let restored: Preprocessor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.transform(&frame()).unwrap(), pre.transform(&frame()).unwrap());
    }
}
