//! Vector data: features, GeoJSON and Shapefile reading, labeled
//! ground-truth points

mod esri;
mod geojson;

pub use esri::read_shapefile;
pub use geojson::{read_geojson, read_geojson_from_str};

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Interpret the attribute as an integer class label.
    ///
    /// Floats are accepted only when they hold an integral value; numeric
    /// strings are parsed.
    pub fn as_label(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features sharing one CRS
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

/// A labeled ground-truth location.
///
/// The footprint is usually a `Point`; polygons sample every pixel whose
/// center they contain.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthPoint {
    pub footprint: Geometry<f64>,
    pub label: i64,
}

/// The ordered ground-truth points of one run.
///
/// Point order is fixed at load time; every band column is joined onto it
/// positionally.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    points: Vec<GroundTruthPoint>,
    crs: Option<CRS>,
}

impl PointSet {
    pub fn new(points: Vec<GroundTruthPoint>, crs: Option<CRS>) -> Self {
        Self { points, crs }
    }

    /// Build from a feature collection, reading the class label from
    /// `label_field`.
    ///
    /// Every feature must carry a geometry and an integer label.
    pub fn from_features(collection: FeatureCollection, label_field: &str) -> Result<Self> {
        let crs = collection.crs;
        let points = collection
            .features
            .into_iter()
            .enumerate()
            .map(|(i, feature)| {
                let label = feature
                    .get_property(label_field)
                    .and_then(AttributeValue::as_label)
                    .ok_or_else(|| Error::InvalidParameter {
                        name: "label_field",
                        value: label_field.to_string(),
                        reason: format!("feature {} has no integer '{}' attribute", i, label_field),
                    })?;
                let footprint = feature.geometry.ok_or_else(|| Error::InvalidParameter {
                    name: "geometry",
                    value: "null".to_string(),
                    reason: format!("feature {} has no geometry", i),
                })?;
                Ok(GroundTruthPoint { footprint, label })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { points, crs })
    }

    /// Read labeled points from a GeoJSON file
    pub fn from_geojson<P: AsRef<Path>>(path: P, label_field: &str) -> Result<Self> {
        Self::from_features(read_geojson(path)?, label_field)
    }

    /// Read labeled points from a Shapefile (`.shp` with its `.dbf`)
    pub fn from_shapefile<P: AsRef<Path>>(path: P, label_field: &str) -> Result<Self> {
        Self::from_features(read_shapefile(path, &[label_field])?, label_field)
    }

    /// Read labeled points, picking the reader from the file extension:
    /// `.shp` for Shapefiles, `.geojson` or `.json` for GeoJSON
    pub fn from_path<P: AsRef<Path>>(path: P, label_field: &str) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "shp" => Self::from_shapefile(path, label_field),
            "geojson" | "json" => Self::from_geojson(path, label_field),
            _ => Err(Error::UnsupportedDataType(format!(
                "{}: expected a .shp, .geojson or .json point file",
                path.display()
            ))),
        }
    }

    pub fn points(&self) -> &[GroundTruthPoint] {
        &self.points
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Class labels in point order
    pub fn labels(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.label).collect()
    }

    /// Footprints in point order
    pub fn footprints(&self) -> Vec<Geometry<f64>> {
        self.points.iter().map(|p| p.footprint.clone()).collect()
    }
}
