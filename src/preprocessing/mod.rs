//! Data validation and feature preprocessing
//!
//! - Column schema checks on the train and test tables
//! - One-hot or ordinal encoding of categorical columns
//! - Standard or min-max scaling of numerical columns

mod schema;
mod transformer;

pub use schema::{ColumnKind, DataSchema, SchemaReport};
pub use transformer::Preprocessor;

use serde::{Deserialize, Serialize};

/// Type of scaler applied to numerical columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerType {
    /// (x - mean) / std
    #[default]
    Standard,
    /// (x - min) / (max - min)
    MinMax,
    None,
}

/// Type of encoder applied to categorical columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderType {
    /// One 0/1 column per category seen during fit
    #[default]
    OneHot,
    /// Position of the category in sorted order, -1 when unseen
    Ordinal,
}

/// Configuration for feature preprocessing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub scaler: ScalerType,
    pub encoder: EncoderType,
}

impl PreprocessingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scaler(mut self, scaler: ScalerType) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderType) -> Self {
        self.encoder = encoder;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml() {
        let config: PreprocessingConfig = serde_yaml::from_str("encoder: ordinal\n").unwrap();
        assert_eq!(config.encoder, EncoderType::Ordinal);
        assert_eq!(config.scaler, ScalerType::Standard);

        let config: PreprocessingConfig = serde_yaml::from_str("scaler: min_max\n").unwrap();
        assert_eq!(config.scaler, ScalerType::MinMax);
        assert_eq!(config.encoder, EncoderType::OneHot);
    }
}
