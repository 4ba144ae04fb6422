//! Minimal GeoJSON FeatureCollection reader
//!
//! Supports Point, MultiPoint, Polygon and MultiPolygon geometries and the
//! legacy named `crs` member written by GDAL/QGIS exports.

use super::{AttributeValue, Feature, FeatureCollection};
use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<RawFeature>,
    #[serde(default)]
    crs: Option<RawCrs>,
}

#[derive(Deserialize)]
struct RawCrs {
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Point { coordinates: Vec<f64> },
    MultiPoint { coordinates: Vec<Vec<f64>> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
}

/// Read a GeoJSON FeatureCollection from a file
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let file = File::open(path.as_ref())?;
    let raw: RawCollection = serde_json::from_reader(BufReader::new(file))?;
    convert(raw)
}

/// Read a GeoJSON FeatureCollection from a string
pub fn read_geojson_from_str(text: &str) -> Result<FeatureCollection> {
    convert(serde_json::from_str(text)?)
}

fn convert(raw: RawCollection) -> Result<FeatureCollection> {
    if raw.kind != "FeatureCollection" {
        return Err(Error::UnsupportedDataType(format!(
            "expected a GeoJSON FeatureCollection, found '{}'",
            raw.kind
        )));
    }

    let crs = raw
        .crs
        .as_ref()
        .and_then(|c| c.properties.get("name"))
        .and_then(Value::as_str)
        .and_then(CRS::from_name);

    let features = raw
        .features
        .into_iter()
        .map(convert_feature)
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureCollection { features, crs })
}

fn convert_feature(raw: RawFeature) -> Result<Feature> {
    let geometry = raw.geometry.map(convert_geometry).transpose()?;

    let properties = raw
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, attribute(value)))
        .collect();

    let id = raw.id.map(|v| match v {
        Value::String(s) => s,
        other => other.to_string(),
    });

    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

fn attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn coord(position: &[f64]) -> Result<Coord<f64>> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(Error::UnsupportedDataType(format!(
            "GeoJSON position needs at least 2 values, found {}",
            position.len()
        ))),
    }
}

fn ring(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|p| coord(p))
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| Error::UnsupportedDataType("polygon without rings".into()))?;
    let interiors = interiors.iter().map(|r| ring(r)).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring(exterior)?, interiors))
}

fn convert_geometry(raw: RawGeometry) -> Result<Geometry<f64>> {
    let geometry = match raw {
        RawGeometry::Point { coordinates } => Geometry::Point(Point::from(coord(&coordinates)?)),
        RawGeometry::MultiPoint { coordinates } => {
            let points = coordinates
                .iter()
                .map(|p| coord(p).map(Point::from))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPoint(MultiPoint::new(points))
        }
        RawGeometry::Polygon { coordinates } => Geometry::Polygon(polygon(&coordinates)?),
        RawGeometry::MultiPolygon { coordinates } => {
            let polygons = coordinates
                .iter()
                .map(|p| polygon(p))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
    };
    Ok(geometry)
}
