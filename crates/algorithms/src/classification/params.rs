//! Classifier families and hyperparameter grids

use landcover_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The supported classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierFamily {
    Svm,
    Knn,
    RandomForest,
}

impl ClassifierFamily {
    pub const ALL: [ClassifierFamily; 3] = [
        ClassifierFamily::Svm,
        ClassifierFamily::Knn,
        ClassifierFamily::RandomForest,
    ];

    /// Short name, also used to name the output raster (`{name}_multi.tif`)
    pub fn name(self) -> &'static str {
        match self {
            ClassifierFamily::Svm => "svm",
            ClassifierFamily::Knn => "knn",
            ClassifierFamily::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ClassifierFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "svm" | "svc" => Ok(ClassifierFamily::Svm),
            "knn" | "k_nn" | "kneighbors" => Ok(ClassifierFamily::Knn),
            "rf" | "random_forest" | "forest" => Ok(ClassifierFamily::RandomForest),
            _ => Err(Error::InvalidParameter {
                name: "family",
                value: s.to_string(),
                reason: "expected svm, knn or random_forest".into(),
            }),
        }
    }
}

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
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

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// One hyperparameter combination, keyed by parameter name
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Render a parameter set as `{a: 1, b: rbf}`
pub fn format_params(params: &ParamSet) -> String {
    let body: Vec<String> = params.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
    format!("{{{}}}", body.join(", "))
}

fn error_for(key: &str, value: &ParamValue, reason: &str) -> Error {
    Error::InvalidParameter {
        name: "hyperparameter",
        value: format!("{}={}", key, value),
        reason: reason.to_string(),
    }
}

/// Typed lookups into a [`ParamSet`], used by the classifier parameter parsers
pub(crate) struct ParamReader<'a> {
    params: &'a ParamSet,
}

impl<'a> ParamReader<'a> {
    /// Reject any key outside `known`
    pub fn new(params: &'a ParamSet, known: &[&str]) -> Result<Self> {
        if let Some((key, value)) = params.iter().find(|(k, _)| !known.contains(&k.as_str())) {
            return Err(error_for(key, value, &format!("unknown parameter, expected one of {}", known.join(", "))));
        }
        Ok(Self { params })
    }

    pub fn raw(&self, key: &str) -> Option<&'a ParamValue> {
        self.params.get(key)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| error_for(key, v, "expected a number")),
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_usize()
                .ok_or_else(|| error_for(key, v, "expected a non-negative integer")),
        }
    }

    pub fn str_or(&self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| error_for(key, v, "expected a string")),
        }
    }

    pub fn invalid(&self, key: &str, reason: &str) -> Error {
        match self.params.get(key) {
            Some(v) => error_for(key, v, reason),
            None => Error::InvalidParameter {
                name: "hyperparameter",
                value: key.to_string(),
                reason: reason.to_string(),
            },
        }
    }
}

/// The search space for one classifier family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    pub family: ClassifierFamily,
    /// Standardize features before the classifier
    #[serde(default)]
    pub standardize: bool,
    /// Candidate values per parameter name
    #[serde(default)]
    pub params: BTreeMap<String, Vec<ParamValue>>,
}

impl HyperparameterGrid {
    pub fn new(family: ClassifierFamily, standardize: bool) -> Self {
        Self {
            family,
            standardize,
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter and its candidate values
    pub fn with(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.params.insert(name.to_string(), values);
        self
    }

    /// Default grid for a family
    pub fn default_for(family: ClassifierFamily) -> Self {
        match family {
            ClassifierFamily::Svm => Self::new(family, true)
                .with(
                    "kernel",
                    ["linear", "rbf", "poly", "sigmoid", "precomputed"]
                        .into_iter()
                        .map(ParamValue::from)
                        .collect(),
                )
                .with(
                    "C",
                    vec![
                        0.001.into(),
                        0.1.into(),
                        1i64.into(),
                        10i64.into(),
                        100i64.into(),
                        1000i64.into(),
                    ],
                )
                .with(
                    "gamma",
                    vec![
                        0.1.into(),
                        1i64.into(),
                        10i64.into(),
                        100i64.into(),
                        "scale".into(),
                        "auto".into(),
                    ],
                ),
            ClassifierFamily::Knn => Self::new(family, true)
                .with(
                    "n_neighbors",
                    std::iter::once(1i64)
                        .chain((2..=20).step_by(2))
                        .map(ParamValue::from)
                        .collect(),
                )
                .with("weights", vec!["uniform".into(), "distance".into()])
                .with(
                    "metric",
                    vec!["euclidean".into(), "manhattan".into(), "minkowski".into()],
                ),
            ClassifierFamily::RandomForest => Self::new(family, false)
                .with(
                    "n_estimators",
                    vec![10i64.into(), 100i64.into(), 1000i64.into()],
                )
                .with(
                    "max_features",
                    vec![
                        "auto".into(),
                        "sqrt".into(),
                        10i64.into(),
                        100i64.into(),
                        1000i64.into(),
                    ],
                ),
        }
    }

    /// Every combination of the candidate values.
    ///
    /// Parameters vary in name order, the last name fastest. A grid without
    /// parameters has exactly one (empty) combination; a parameter with no
    /// values leaves none.
    pub fn candidates(&self) -> Vec<ParamSet> {
        let mut combos = vec![ParamSet::new()];
        for (name, values) in &self.params {
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |v| {
                        let mut next = base.clone();
                        next.insert(name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        combos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_sizes() {
        assert_eq!(HyperparameterGrid::default_for(ClassifierFamily::Svm).candidates().len(), 180);
        assert_eq!(HyperparameterGrid::default_for(ClassifierFamily::Knn).candidates().len(), 66);
        assert_eq!(
            HyperparameterGrid::default_for(ClassifierFamily::RandomForest).candidates().len(),
            15
        );
    }

    #[test]
    fn test_candidates_order() {
        let grid = HyperparameterGrid::new(ClassifierFamily::Knn, true)
            .with("weights", vec!["uniform".into(), "distance".into()])
            .with("n_neighbors", vec![1i64.into(), 3i64.into()]);
        let combos = grid.candidates();
        assert_eq!(combos.len(), 4);
        assert_eq!(format_params(&combos[0]), "{n_neighbors: 1, weights: uniform}");
        assert_eq!(format_params(&combos[1]), "{n_neighbors: 1, weights: distance}");
        assert_eq!(format_params(&combos[3]), "{n_neighbors: 3, weights: distance}");
    }

    #[test]
    fn test_empty_grids() {
        let grid = HyperparameterGrid::new(ClassifierFamily::Svm, true);
        assert_eq!(grid.candidates(), vec![ParamSet::new()]);
        let grid = grid.with("C", Vec::new());
        assert!(grid.candidates().is_empty());
    }

    #[test]
    fn test_param_value_json() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[1, 0.5, "rbf"]"#).unwrap();
        assert_eq!(
            values,
            vec![ParamValue::Int(1), ParamValue::Float(0.5), ParamValue::Text("rbf".into())]
        );
        assert_eq!(values[0].as_f64(), Some(1.0));
        assert_eq!(values[1].as_usize(), None);
    }

    #[test]
    fn test_family_names() {
        assert_eq!("SVC".parse::<ClassifierFamily>().unwrap(), ClassifierFamily::Svm);
        assert_eq!("random-forest".parse::<ClassifierFamily>().unwrap(), ClassifierFamily::RandomForest);
        assert!("tree".parse::<ClassifierFamily>().is_err());
        assert_eq!(ClassifierFamily::Knn.to_string(), "knn");
    }

    #[test]
    fn test_reader_rejects_unknown_keys() {
        let mut params = ParamSet::new();
        params.insert("n_neighbours".into(), 3i64.into());
        assert!(ParamReader::new(&params, &["n_neighbors"]).is_err());
    }
}
