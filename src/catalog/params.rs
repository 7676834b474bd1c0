//! Hyperparameter values and ordered parameter sets

use crate::error::{FactoryError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single catalog value: a scalar, or a nested list or mapping such as
/// `hidden_layer_sizes: [100, 50]` or `class_weight: {0: 1, 1: 3}`.
///
/// Variant order matters for untagged deserialization: integers must be
/// tried before floats so `10` stays an `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
    /// Mapping keys are kept in their string form
    Map(Params),
}

impl ParamValue {
    /// Get as float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int. Floats are accepted only when integral.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ParamValue::List(_) | ParamValue::Map(_))
    }

    /// Convert any YAML value, nesting lists and mappings
    pub fn from_yaml(value: &serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ParamValue::String(s.clone()),
            Value::Sequence(items) => ParamValue::List(items.iter().map(Self::from_yaml).collect()),
            Value::Mapping(map) => ParamValue::Map(
                map.iter()
                    .map(|(k, v)| (Self::from_yaml(k).to_string(), Self::from_yaml(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::String(v) => write!(f, "{}", v),
            ParamValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ParamValue::Map(params) => write!(f, "{}", params),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

/// Ordered set of named parameter values.
///
/// Insertion order is preserved so that reports and trial logs list
/// parameters the way the catalog declared them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Insert or replace a value. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `self` overridden by `other`: shared keys take `other`'s value,
    /// new keys are appended in `other`'s order.
    pub fn merged(&self, other: &Params) -> Params {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k, v.clone());
        }
        out
    }

    /// Fail on any key outside `allowed`.
    pub fn ensure_known(&self, estimator: &str, allowed: &[&str]) -> Result<()> {
        for key in self.keys() {
            if !allowed.contains(&key) {
                return Err(FactoryError::invalid_param(
                    key,
                    self.get(key).map(|v| v.to_string()).unwrap_or_default(),
                    format!("not a parameter of {}", estimator),
                ));
            }
        }
        Ok(())
    }

    /// Read a float parameter, falling back to `default` when absent.
    pub fn float_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_float()
                .ok_or_else(|| FactoryError::invalid_param(name, v, "expected a number")),
        }
    }

    /// Read a non-negative integer parameter.
    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_int()
                .filter(|i| *i >= 0)
                .map(|i| i as usize)
                .ok_or_else(|| FactoryError::invalid_param(name, v, "expected a non-negative integer")),
        }
    }

    /// Read an optional non-negative integer; `null` maps to `None`.
    pub fn opt_usize(&self, name: &str) -> Result<Option<usize>> {
        match self.get(name) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(_) => self.usize_or(name, 0).map(Some),
        }
    }

    pub fn opt_u64(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.opt_usize(name)?.map(|v| v as u64))
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| FactoryError::invalid_param(name, v, "expected a boolean")),
        }
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_str()
                .ok_or_else(|| FactoryError::invalid_param(name, v, "expected a string")),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = Params;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of parameter names to values")
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Params, E> {
                Ok(Params::new())
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> std::result::Result<Params, M::Error> {
                let mut params = Params::new();
                while let Some((k, v)) = access.next_entry::<String, ParamValue>()? {
                    params.insert(k, v);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_any(ParamsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_position() {
        let mut params = Params::new().with("a", 1i64).with("b", 2i64);
        params.insert("a", ParamValue::Int(10));
        let keys: Vec<&str> = params.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&ParamValue::Int(10)));
    }

    #[test]
    fn test_merged_overrides_and_appends() {
        let base = Params::new().with("random_state", 42i64).with("max_depth", 3i64);
        let combo = Params::new().with("max_depth", 5i64).with("n_estimators", 10i64);
        let merged = base.merged(&combo);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("max_depth"), Some(&ParamValue::Int(5)));
        assert_eq!(merged.keys().last(), Some("n_estimators"));
    }

    #[test]
    fn test_typed_accessors() {
        let params = Params::new()
            .with("C", 0.5)
            .with("max_depth", ParamValue::Null)
            .with("criterion", "gini");

        assert_eq!(params.float_or("C", 1.0).unwrap(), 0.5);
        assert_eq!(params.opt_usize("max_depth").unwrap(), None);
        assert_eq!(params.str_or("criterion", "entropy").unwrap(), "gini");
        assert!(params.usize_or("criterion", 1).is_err());
    }

    #[test]
    fn test_ensure_known_rejects_unknown() {
        let params = Params::new().with("bogus", 1i64);
        let err = params.ensure_known("GaussianNB", &["var_smoothing"]).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidParameter { .. }));
    }

    #[test]
    fn test_yaml_round_trip_preserves_order_and_types() {
        let params = Params::new()
            .with("n_estimators", 50i64)
            .with("criterion", "entropy")
            .with("max_features", 0.5)
            .with("max_depth", ParamValue::Null);

        let yaml = serde_yaml::to_string(&params).unwrap();
        let back: Params = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_nested_values_from_yaml() {
        let value: serde_yaml::Value = serde_yaml::from_str("{0: 1, 1: 3.5}").unwrap();
        let weights = ParamValue::from_yaml(&value);
        let expected = Params::new().with("0", 1i64).with("1", 3.5);
        assert_eq!(weights, ParamValue::Map(expected));
        assert!(!weights.is_scalar());

        let value: serde_yaml::Value = serde_yaml::from_str("[100, 50]").unwrap();
        let layers = ParamValue::from_yaml(&value);
        assert_eq!(layers, ParamValue::List(vec![ParamValue::Int(100), ParamValue::Int(50)]));
        assert_eq!(layers.to_string(), "[100, 50]");
        assert_eq!(layers.as_int(), None);
    }

    #[test]
    fn test_nested_values_round_trip_json() {
        let params = Params::new()
            .with("hidden_layer_sizes", ParamValue::List(vec![ParamValue::Int(100), ParamValue::Int(50)]))
            .with("class_weight", ParamValue::Map(Params::new().with("0", 1i64).with("1", 3i64)));

        let json = serde_json::to_string(&params).unwrap();
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
