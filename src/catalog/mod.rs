//! Model catalog parsing
//!
//! A catalog declares the candidate estimators of a factory run: where each
//! estimator lives (`module`), what it is called (`class`), the keyword
//! arguments applied to every trial (`params`) and the hyperparameter grid to
//! search (`search_param_grid`).
//!
//! Three YAML layouts are accepted:
//!
//! ```yaml
//! # 1. bare list
//! - module: sklearn.ensemble
//!   class: RandomForestClassifier
//!   params: { random_state: 42 }
//!   search_param_grid:
//!     n_estimators: [10, 50]
//!     max_depth: [3, 5]
//!
//! # 2. list under `models`, with optional search settings
//! search: { strategy: random, n_iter: 10, cv: 3 }
//! models:
//!   - module: builtin
//!     class: GaussianNB
//!
//! # 3. keyed entries under `model_selection`, search settings under `grid_search`
//! grid_search:
//!   class: GridSearchCV
//!   params: { cv: 5 }
//! model_selection:
//!   module_0:
//!     module: sklearn.neighbors
//!     class: KNeighborsClassifier
//!     search_param_grid:
//!       n_neighbors: [3, 5, 7]
//! ```

mod params;

pub use params::{ParamValue, Params};

use crate::config::SearchStrategy;
use crate::error::{FactoryError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{debug, info};

/// One hyperparameter axis of a search grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// Ordered hyperparameter grid: parameter name -> candidate values.
///
/// Axes keep catalog declaration order. Axes with no candidates are kept
/// here for diagnostics but contribute nothing to the search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<GridAxis>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis
    pub fn axis(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.axes.push(GridAxis {
            name: name.into(),
            values,
        });
        self
    }

    /// All declared axes, including empty ones
    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    /// Axes that have at least one candidate
    pub fn effective_axes(&self) -> impl Iterator<Item = &GridAxis> {
        self.axes.iter().filter(|a| !a.values.is_empty())
    }

    /// Names of axes skipped for having no candidates
    pub fn skipped_axes(&self) -> Vec<&str> {
        self.axes
            .iter()
            .filter(|a| a.values.is_empty())
            .map(|a| a.name.as_str())
            .collect()
    }

    /// True when there is nothing to search (single-fit case)
    pub fn is_empty(&self) -> bool {
        self.effective_axes().next().is_none()
    }

    /// Size of the cross product of effective axes (1 for an empty grid)
    pub fn n_combinations(&self) -> usize {
        self.effective_axes().map(|a| a.values.len()).product()
    }
}

/// A parsed catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Entry label (`module_0` style key or list position)
    pub key: String,
    pub module_reference: String,
    pub class_name: String,
    pub base_params: Params,
    pub search_grid: ParamGrid,
}

impl ModelSpec {
    pub fn new(module: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            key: String::new(),
            module_reference: module.into(),
            class_name: class_name.into(),
            base_params: Params::new(),
            search_grid: ParamGrid::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.base_params = params;
        self
    }

    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.search_grid = grid;
        self
    }
}

/// Search settings declared inside a catalog. Each field, when present,
/// overrides the corresponding run configuration value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOverrides {
    pub strategy: Option<SearchStrategy>,
    pub cv_folds: Option<usize>,
    pub random_state: Option<u64>,
    pub scoring: Option<String>,
}

/// Parsed catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub entries: Vec<ModelSpec>,
    pub search: SearchOverrides,
}

impl Catalog {
    /// Read and parse a catalog file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FactoryError::CatalogFormat(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_yaml_str(&text)?;
        info!(
            path = %path.display(),
            entries = catalog.len(),
            "Parsed model catalog"
        );
        Ok(catalog)
    }

    /// Parse catalog text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)
            .map_err(|e| FactoryError::CatalogFormat(format!("invalid YAML: {}", e)))?;

        match &root {
            Value::Sequence(items) => Ok(Self {
                entries: parse_entry_list(items)?,
                search: SearchOverrides::default(),
            }),
            Value::Mapping(map) => parse_mapping_root(map),
            Value::Null => Err(FactoryError::CatalogFormat("catalog is empty".to_string())),
            _ => Err(FactoryError::CatalogFormat(
                "top level must be a list of entries or a mapping".to_string(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.entries.iter()
    }
}

fn parse_mapping_root(map: &Mapping) -> Result<Catalog> {
    if let Some(models) = map.get("models") {
        let items = models.as_sequence().ok_or_else(|| {
            FactoryError::CatalogFormat("'models' must be a list of entries".to_string())
        })?;
        let search = match map.get("search") {
            Some(section) => parse_search_section(section)?,
            None => SearchOverrides::default(),
        };
        return Ok(Catalog {
            entries: parse_entry_list(items)?,
            search,
        });
    }

    if let Some(selection) = map.get("model_selection") {
        let keyed = selection.as_mapping().ok_or_else(|| {
            FactoryError::CatalogFormat("'model_selection' must be a mapping".to_string())
        })?;
        let mut entries = Vec::with_capacity(keyed.len());
        for (key, entry) in keyed {
            let key = key.as_str().ok_or_else(|| {
                FactoryError::CatalogFormat("model_selection keys must be strings".to_string())
            })?;
            entries.push(parse_entry(key, entry)?);
        }
        let search = match map.get("grid_search") {
            Some(section) => parse_grid_search_section(section)?,
            None => SearchOverrides::default(),
        };
        return Ok(Catalog { entries, search });
    }

    Err(FactoryError::CatalogFormat(
        "mapping catalog needs a 'models' list or a 'model_selection' mapping".to_string(),
    ))
}

fn parse_entry_list(items: &[Value]) -> Result<Vec<ModelSpec>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_entry(&format!("module_{}", i), item))
        .collect()
}

fn parse_entry(key: &str, entry: &Value) -> Result<ModelSpec> {
    let map = entry.as_mapping().ok_or_else(|| {
        FactoryError::CatalogFormat(format!("entry '{}' must be a mapping", key))
    })?;

    let module = required_str(map, key, "module")?;
    let class_name = required_str(map, key, "class")?;

    let base_params = match map.get("params") {
        None | Some(Value::Null) => Params::new(),
        Some(value) => parse_params(key, "params", value)?,
    };

    let search_grid = match map.get("search_param_grid") {
        None | Some(Value::Null) => ParamGrid::new(),
        Some(value) => parse_grid(key, value)?,
    };

    debug!(
        entry = key,
        class = %class_name,
        combinations = search_grid.n_combinations(),
        "Parsed catalog entry"
    );

    Ok(ModelSpec {
        key: key.to_string(),
        module_reference: module,
        class_name,
        base_params,
        search_grid,
    })
}

fn required_str(map: &Mapping, key: &str, field: &str) -> Result<String> {
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(FactoryError::CatalogFormat(format!(
            "entry '{}': '{}' must be a non-empty string",
            key, field
        ))),
        None => Err(FactoryError::CatalogFormat(format!(
            "entry '{}': missing required key '{}'",
            key, field
        ))),
    }
}

fn parse_params(key: &str, field: &str, value: &Value) -> Result<Params> {
    let map = value.as_mapping().ok_or_else(|| {
        FactoryError::CatalogFormat(format!("entry '{}': '{}' must be a mapping", key, field))
    })?;

    let mut params = Params::new();
    for (name, v) in map {
        let name = name.as_str().ok_or_else(|| {
            FactoryError::CatalogFormat(format!("entry '{}': parameter names must be strings", key))
        })?;
        params.insert(name, ParamValue::from_yaml(v));
    }
    Ok(params)
}

fn parse_grid(key: &str, value: &Value) -> Result<ParamGrid> {
    let map = value.as_mapping().ok_or_else(|| {
        FactoryError::CatalogFormat(format!(
            "entry '{}': 'search_param_grid' must be a mapping",
            key
        ))
    })?;

    let mut grid = ParamGrid::new();
    for (name, candidates) in map {
        let name = name.as_str().ok_or_else(|| {
            FactoryError::CatalogFormat(format!("entry '{}': grid names must be strings", key))
        })?;
        // Candidates are checked by the estimator constructor, so an odd
        // value fails its own trial instead of the whole catalog.
        let values = match candidates {
            Value::Sequence(items) => items.iter().map(ParamValue::from_yaml).collect(),
            _ => {
                return Err(FactoryError::CatalogFormat(format!(
                    "entry '{}': grid '{}' must be a list of candidate values",
                    key, name
                )))
            }
        };
        grid = grid.axis(name, values);
    }
    Ok(grid)
}

fn parse_search_section(section: &Value) -> Result<SearchOverrides> {
    let map = section.as_mapping().ok_or_else(|| {
        FactoryError::CatalogFormat("'search' must be a mapping".to_string())
    })?;

    let n_iter = opt_usize_field(map, "search", "n_iter")?;
    let strategy = match map.get("strategy") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(SearchStrategy::parse(s, n_iter).map_err(|e| {
            FactoryError::CatalogFormat(format!("search.strategy: {}", e))
        })?),
        Some(_) => {
            return Err(FactoryError::CatalogFormat(
                "search.strategy must be a string".to_string(),
            ))
        }
    };

    Ok(SearchOverrides {
        strategy,
        cv_folds: opt_usize_field(map, "search", "cv")?,
        random_state: opt_usize_field(map, "search", "random_state")?.map(|v| v as u64),
        scoring: match map.get("scoring") {
            Some(Value::String(s)) => Some(s.clone()),
            None | Some(Value::Null) => None,
            Some(_) => {
                return Err(FactoryError::CatalogFormat(
                    "search.scoring must be a string".to_string(),
                ))
            }
        },
    })
}

/// `grid_search: { class: GridSearchCV | RandomizedSearchCV, params: {cv, n_iter, ...} }`
fn parse_grid_search_section(section: &Value) -> Result<SearchOverrides> {
    let map = section.as_mapping().ok_or_else(|| {
        FactoryError::CatalogFormat("'grid_search' must be a mapping".to_string())
    })?;

    let params = match map.get("params") {
        None | Some(Value::Null) => Mapping::new(),
        Some(Value::Mapping(m)) => m.clone(),
        Some(_) => {
            return Err(FactoryError::CatalogFormat(
                "grid_search.params must be a mapping".to_string(),
            ))
        }
    };

    let n_iter = opt_usize_field(&params, "grid_search.params", "n_iter")?;
    let strategy = match map.get("class").and_then(Value::as_str) {
        Some("RandomizedSearchCV") => Some(SearchStrategy::Random {
            n_iter: n_iter.unwrap_or(SearchStrategy::DEFAULT_N_ITER),
        }),
        Some("GridSearchCV") | None => Some(SearchStrategy::Grid),
        Some(other) => {
            return Err(FactoryError::CatalogFormat(format!(
                "grid_search.class '{}' is not a supported search strategy",
                other
            )))
        }
    };

    Ok(SearchOverrides {
        strategy,
        cv_folds: opt_usize_field(&params, "grid_search.params", "cv")?,
        random_state: opt_usize_field(&params, "grid_search.params", "random_state")?
            .map(|v| v as u64),
        scoring: params.get("scoring").and_then(Value::as_str).map(String::from),
    })
}

fn opt_usize_field(map: &Mapping, section: &str, field: &str) -> Result<Option<usize>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| Some(v as usize))
            .ok_or_else(|| {
                FactoryError::CatalogFormat(format!(
                    "{}.{} must be a non-negative integer",
                    section, field
                ))
            }),
        Some(_) => Err(FactoryError::CatalogFormat(format!(
            "{}.{} must be a non-negative integer",
            section, field
        ))),
    }
}
