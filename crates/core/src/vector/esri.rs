//! ESRI Shapefile reader
//!
//! Geometry comes from the `.shp`, attributes from the `.dbf` and the CRS
//! from the `.prj` sidecar when one exists.

use super::{AttributeValue, Feature, FeatureCollection};
use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::Geometry;
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Read a Shapefile, keeping only the `attributes` named
pub fn read_shapefile<P: AsRef<Path>>(path: P, attributes: &[&str]) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let mut reader = shapefile::Reader::from_path(path)?;

    let mut features = Vec::new();
    for (index, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item?;
        let geometry = match shape {
            Shape::NullShape => None,
            shape => Some(Geometry::<f64>::try_from(shape).map_err(|e| {
                Error::UnsupportedDataType(format!("{} record {}: {}", path.display(), index, e))
            })?),
        };
        let properties: HashMap<String, AttributeValue> = attributes
            .iter()
            .filter_map(|&name| record.get(name).map(|v| (name.to_string(), attribute(v))))
            .collect();
        features.push(Feature {
            geometry,
            properties,
            id: None,
        });
    }

    Ok(FeatureCollection {
        features,
        crs: read_prj(path)?,
    })
}

fn attribute(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Numeric(Some(v)) | FieldValue::Double(v) => AttributeValue::Float(*v),
        FieldValue::Float(Some(v)) => AttributeValue::Float(f64::from(*v)),
        FieldValue::Integer(v) => AttributeValue::Int(i64::from(*v)),
        FieldValue::Character(Some(s)) => AttributeValue::String(s.trim().to_string()),
        FieldValue::Logical(Some(b)) => AttributeValue::Bool(*b),
        _ => AttributeValue::Null,
    }
}

fn read_prj(path: &Path) -> Result<Option<CRS>> {
    let prj = path.with_extension("prj");
    if !prj.exists() {
        return Ok(None);
    }
    let wkt = fs::read_to_string(&prj)?;
    let wkt = wkt.trim();
    Ok((!wkt.is_empty()).then(|| CRS::from_wkt(wkt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapefile::dbase::{FieldName, Record, TableWriterBuilder};

    const UTM33N: &str = r#"PROJCS["WGS 84 / UTM zone 33N",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]],PROJECTION["Transverse_Mercator"],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","32633"]]"#;

    fn write_points(path: &Path, points: &[(f64, f64, f64)]) {
        let table = TableWriterBuilder::new()
            .add_numeric_field(FieldName::try_from("id").unwrap(), 10, 0);
        let mut writer = shapefile::Writer::from_path(path, table).unwrap();
        for &(x, y, id) in points {
            let mut record = Record::default();
            record.insert("id".to_string(), FieldValue::Numeric(Some(id)));
            writer
                .write_shape_and_record(&shapefile::Point::new(x, y), &record)
                .unwrap();
        }
    }

    #[test]
    fn test_points_and_prj_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gbin.shp");
        write_points(&path, &[(400005.0, 5799995.0, 1.0), (400105.0, 5799895.0, 0.0)]);
        fs::write(path.with_extension("prj"), UTM33N).unwrap();

        let collection = read_shapefile(&path, &["id"]).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.crs.as_ref().and_then(CRS::epsg), Some(32633));

        let first = &collection.features[0];
        assert_eq!(
            first.geometry,
            Some(Geometry::Point(geo_types::Point::new(400005.0, 5799995.0)))
        );
        assert_eq!(first.get_property("id").and_then(AttributeValue::as_label), Some(1));
        assert_eq!(
            collection.features[1].get_property("id").and_then(AttributeValue::as_label),
            Some(0)
        );
    }

    #[test]
    fn test_missing_prj_leaves_crs_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.shp");
        write_points(&path, &[(1.0, 2.0, 3.0)]);

        let collection = read_shapefile(&path, &["id", "absent"]).unwrap();
        assert_eq!(collection.crs, None);
        assert!(collection.features[0].get_property("absent").is_none());
    }

    #[test]
    fn test_numeric_labels_convert() {
        assert_eq!(attribute(&FieldValue::Numeric(Some(4.0))).as_label(), Some(4));
        assert_eq!(attribute(&FieldValue::Integer(7)).as_label(), Some(7));
        assert_eq!(attribute(&FieldValue::Numeric(None)), AttributeValue::Null);
    }
}
