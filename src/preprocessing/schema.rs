//! Column schema of the train/test tables and the checks run against it

use crate::error::{FactoryError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Kind of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numerical,
    Categorical,
}

impl ColumnKind {
    /// Kind of a polars dtype, `None` for types neither kind accepts
    pub fn of(dtype: &DataType) -> Option<Self> {
        if dtype.is_numeric() || matches!(dtype, DataType::Boolean) {
            Some(Self::Numerical)
        } else if matches!(dtype, DataType::String) {
            Some(Self::Categorical)
        } else {
            None
        }
    }
}

/// Expected layout of a table.
///
/// `columns` lists every column including the target. Columns named in
/// `drop_columns` must be present but are not used as features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSchema {
    pub columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub drop_columns: Vec<String>,
}

/// Result of checking one table against a schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub expected_columns: usize,
    pub actual_columns: usize,
    pub missing_numerical: Vec<String>,
    pub missing_categorical: Vec<String>,
    /// Columns present with the wrong kind, as `name: dtype`
    pub mistyped: Vec<String>,
}

impl SchemaReport {
    pub fn column_count_ok(&self) -> bool {
        self.expected_columns == self.actual_columns
    }

    pub fn is_valid(&self) -> bool {
        self.column_count_ok()
            && self.missing_numerical.is_empty()
            && self.missing_categorical.is_empty()
            && self.mistyped.is_empty()
    }

    fn describe(&self) -> String {
        let mut problems = Vec::new();
        if !self.column_count_ok() {
            problems.push(format!(
                "expected {} columns, found {}",
                self.expected_columns, self.actual_columns
            ));
        }
        if !self.missing_numerical.is_empty() {
            problems.push(format!("missing numerical columns [{}]", self.missing_numerical.join(", ")));
        }
        if !self.missing_categorical.is_empty() {
            problems.push(format!("missing categorical columns [{}]", self.missing_categorical.join(", ")));
        }
        if !self.mistyped.is_empty() {
            problems.push(format!("wrong column types [{}]", self.mistyped.join(", ")));
        }
        problems.join("; ")
    }
}

impl DataSchema {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let schema: Self = serde_yaml::from_str(&text)
            .map_err(|e| FactoryError::ConfigError(format!("schema {}: {}", path.display(), e)))?;
        if schema.columns.is_empty() {
            return Err(FactoryError::ConfigError(format!("schema {} lists no columns", path.display())));
        }
        Ok(schema)
    }

    /// Schema of `df` as it is. The target is listed in `columns` but
    /// in neither kind list.
    pub fn infer(df: &DataFrame, target: &str) -> Result<Self> {
        let mut schema = Self::default();
        for series in df.get_columns() {
            let name = series.name().to_string();
            schema.columns.push(name.clone());
            if name == target {
                continue;
            }
            match ColumnKind::of(series.dtype()) {
                Some(ColumnKind::Numerical) => schema.numerical_columns.push(name),
                Some(ColumnKind::Categorical) => schema.categorical_columns.push(name),
                None => {
                    return Err(FactoryError::DataError(format!(
                        "column '{}' has unsupported type {}",
                        name,
                        series.dtype()
                    )))
                }
            }
        }
        debug!(
            numerical = schema.numerical_columns.len(),
            categorical = schema.categorical_columns.len(),
            "Inferred data schema"
        );
        Ok(schema)
    }

    pub fn with_drop_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.drop_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Feature columns of one kind, in schema order, minus the target and
    /// dropped columns
    pub fn features(&self, kind: ColumnKind, target: &str) -> Vec<String> {
        let source = match kind {
            ColumnKind::Numerical => &self.numerical_columns,
            ColumnKind::Categorical => &self.categorical_columns,
        };
        source
            .iter()
            .filter(|c| c.as_str() != target && !self.drop_columns.contains(c))
            .cloned()
            .collect()
    }

    /// Column count, presence of every numerical and categorical column,
    /// and their dtypes
    pub fn check(&self, df: &DataFrame) -> SchemaReport {
        let mut report = SchemaReport {
            expected_columns: self.columns.len(),
            actual_columns: df.width(),
            ..Default::default()
        };

        for (kind, columns, missing) in [
            (ColumnKind::Numerical, &self.numerical_columns, &mut report.missing_numerical),
            (ColumnKind::Categorical, &self.categorical_columns, &mut report.missing_categorical),
        ] {
            for name in columns {
                match df.column(name) {
                    Err(_) => missing.push(name.clone()),
                    Ok(series) if ColumnKind::of(series.dtype()) != Some(kind) => {
                        report.mistyped.push(format!("{}: {}", name, series.dtype()))
                    }
                    Ok(_) => {}
                }
            }
        }
        report
    }

    /// `check`, turned into a `ValidationError` naming the table
    pub fn validate(&self, df: &DataFrame, table: &str) -> Result<()> {
        let report = self.check(df);
        info!(table, valid = report.is_valid(), "Column validation");
        if report.is_valid() {
            Ok(())
        } else {
            Err(FactoryError::ValidationError(format!("{} table: {}", table, report.describe())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visa_frame() -> DataFrame {
        df! {
            "continent" => ["Asia", "Europe", "Asia"],
            "no_of_employees" => [120i64, 40, 3000],
            "prevailing_wage" => [5000.0, 8000.0, 9100.5],
            "case_id" => ["EZYV01", "EZYV02", "EZYV03"],
            "case_status" => ["Certified", "Denied", "Certified"],
        }
        .unwrap()
    }

    #[test]
    fn test_infer_splits_kinds_and_skips_target() {
        let schema = DataSchema::infer(&visa_frame(), "case_status").unwrap();
        assert_eq!(schema.columns.len(), 5);
        assert_eq!(schema.numerical_columns, vec!["no_of_employees", "prevailing_wage"]);
        assert_eq!(schema.categorical_columns, vec!["continent", "case_id"]);
    }

    #[test]
    fn test_features_exclude_dropped_columns() {
        let schema = DataSchema::infer(&visa_frame(), "case_status")
            .unwrap()
            .with_drop_columns(["case_id"]);
        assert_eq!(schema.features(ColumnKind::Categorical, "case_status"), vec!["continent"]);
        assert_eq!(schema.features(ColumnKind::Numerical, "case_status").len(), 2);
    }

    #[test]
    fn test_missing_column_fails_validation() {
        let schema = DataSchema::infer(&visa_frame(), "case_status").unwrap();
        let trimmed = visa_frame().drop("continent").unwrap();

        let report = schema.check(&trimmed);
        assert!(!report.column_count_ok());
        assert_eq!(report.missing_categorical, vec!["continent"]);
        assert!(report.missing_numerical.is_empty());

        let err = schema.validate(&trimmed, "test").unwrap_err();
        assert!(matches!(err, FactoryError::ValidationError(ref m) if m.contains("continent")));
    }

    #[test]
    fn test_wrong_kind_fails_validation() {
        let schema = DataSchema::infer(&visa_frame(), "case_status").unwrap();
        let df = df! {
            "continent" => ["Asia", "Europe", "Asia"],
            "no_of_employees" => ["many", "few", "many"],
            "prevailing_wage" => [5000.0, 8000.0, 9100.5],
            "case_id" => ["EZYV01", "EZYV02", "EZYV03"],
            "case_status" => ["Certified", "Denied", "Certified"],
        }
        .unwrap();

        let report = schema.check(&df);
        assert!(report.column_count_ok());
        assert_eq!(report.mistyped.len(), 1);
        assert!(report.mistyped[0].starts_with("no_of_employees"));
    }

    #[test]
    fn test_schema_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            "columns: [continent, prevailing_wage, case_status]\nnumerical_columns: [prevailing_wage]\ncategorical_columns: [continent, case_status]\n",
        )
        .unwrap();

        let schema = DataSchema::from_yaml_file(&path).unwrap();
        assert_eq!(schema.features(ColumnKind::Categorical, "case_status"), vec!["continent"]);
        assert!(schema.drop_columns.is_empty());
    }

    #[test]
    fn test_schema_without_columns_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(&path, "numerical_columns: [a]\n").unwrap();
        assert!(matches!(DataSchema::from_yaml_file(&path), Err(FactoryError::ConfigError(_))));
    }
}
