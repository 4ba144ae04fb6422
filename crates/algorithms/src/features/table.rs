//! Feature schema and labeled feature table
//!
//! A feature table has one row per ground-truth point and one column per
//! band raster, holding the zonal statistic of that band at the point. The
//! [`FeatureSchema`] records the statistic and the band order; it travels
//! with the table into training and with the fitted pipeline into inference.

use super::bands::BandFile;
use crate::statistics::{zonal_statistic, ZonalStatistic};
use landcover_core::io::read_geotiff;
use landcover_core::vector::PointSet;
use landcover_core::{Error, Raster, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Name of the label column
pub const LABEL_COLUMN: &str = "id";

/// Ordered feature columns and the statistic that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub statistic: ZonalStatistic,
    /// Band names in column order
    pub bands: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema, rejecting repeated band names
    pub fn new(statistic: ZonalStatistic, bands: Vec<String>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for band in &bands {
            if !seen.insert(band.as_str()) {
                return Err(Error::DuplicateColumn {
                    column: format!("{}_{}", statistic.name(), band),
                    path: band.clone(),
                });
            }
        }
        Ok(Self { statistic, bands })
    }

    /// Feature column names, `{statistic}_{band}`, in order
    pub fn columns(&self) -> Vec<String> {
        self.bands
            .iter()
            .map(|b| format!("{}_{}", self.statistic.name(), b))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Check that `found` names exactly these bands in exactly this order
    pub fn check_bands<S: AsRef<str>>(&self, found: &[S]) -> Result<()> {
        let same = found.len() == self.bands.len()
            && found.iter().zip(&self.bands).all(|(f, b)| f.as_ref() == b);
        if same {
            Ok(())
        } else {
            Err(Error::FeatureOrderMismatch {
                expected: self.bands.clone(),
                found: found.iter().map(|f| f.as_ref().to_string()).collect(),
            })
        }
    }

    /// Check that another schema is identical to this one
    pub fn check(&self, other: &FeatureSchema) -> Result<()> {
        if self.statistic != other.statistic {
            return Err(Error::FeatureOrderMismatch {
                expected: self.columns(),
                found: other.columns(),
            });
        }
        self.check_bands(&other.bands)
    }
}

/// One table row as written to disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub id: i64,
    pub features: Vec<f64>,
}

/// Labeled feature table: `labels[i]` and row `i` of `values` describe point `i`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    schema: FeatureSchema,
    labels: Vec<i64>,
    values: Array2<f64>,
}

impl FeatureTable {
    /// Assemble a table, checking that labels, values and schema agree
    pub fn new(schema: FeatureSchema, labels: Vec<i64>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != labels.len() || values.ncols() != schema.len() {
            return Err(Error::SizeMismatch {
                er: labels.len(),
                ec: schema.len(),
                ar: values.nrows(),
                ac: values.ncols(),
            });
        }
        if let Some(((row, col), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "values",
                value: v.to_string(),
                reason: format!("non-finite feature at row {}, column {}", row, col),
            });
        }
        Ok(Self {
            schema,
            labels,
            values,
        })
    }

    /// Rows in table order, as written by `extract`
    pub fn records(&self) -> Vec<FeatureRecord> {
        self.labels
            .iter()
            .zip(self.values.outer_iter())
            .map(|(&id, row)| FeatureRecord {
                id,
                features: row.to_vec(),
            })
            .collect()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    /// Number of rows (points)
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    /// Number of columns including the label column
    pub fn n_columns(&self) -> usize {
        self.schema.len() + 1
    }

    /// All column names, label column first
    pub fn column_names(&self) -> Vec<String> {
        std::iter::once(LABEL_COLUMN.to_string())
            .chain(self.schema.columns())
            .collect()
    }

    /// Distinct class labels, ascending
    pub fn classes(&self) -> Vec<i64> {
        let set: BTreeSet<i64> = self.labels.iter().copied().collect();
        set.into_iter().collect()
    }

    /// View over a subset of rows
    pub fn view<'a>(&'a self, rows: &'a [usize]) -> FeatureTableView<'a> {
        FeatureTableView { table: self, rows }
    }
}

/// A row subset of a feature table, borrowed from it
#[derive(Debug, Clone, Copy)]
pub struct FeatureTableView<'a> {
    table: &'a FeatureTable,
    rows: &'a [usize],
}

impl<'a> FeatureTableView<'a> {
    pub fn schema(&self) -> &'a FeatureSchema {
        &self.table.schema
    }

    pub fn rows(&self) -> &'a [usize] {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature matrix of the selected rows, in view order
    pub fn features(&self) -> Array2<f64> {
        self.table.values.select(Axis(0), self.rows)
    }

    /// Labels of the selected rows, in view order
    pub fn labels(&self) -> Vec<i64> {
        self.rows.iter().map(|&i| self.table.labels[i]).collect()
    }
}

/// Accumulates one feature column per band raster for a fixed point set
pub struct FeatureTableBuilder<'a> {
    points: &'a PointSet,
    statistic: ZonalStatistic,
    bands: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl<'a> FeatureTableBuilder<'a> {
    pub fn new(points: &'a PointSet, statistic: ZonalStatistic) -> Self {
        Self {
            points,
            statistic,
            bands: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Sample `raster` at every point and append the column `{statistic}_{band}`.
    ///
    /// `source` names the raster in error messages. Fails when the column
    /// already exists, when the raster CRS differs from the point CRS, or
    /// when any point has no valid pixel under it.
    pub fn add_band(&mut self, band: &str, source: &str, raster: &Raster<f64>) -> Result<()> {
        let column = format!("{}_{}", self.statistic.name(), band);
        if self.bands.iter().any(|b| b == band) {
            return Err(Error::DuplicateColumn {
                column,
                path: source.to_string(),
            });
        }

        if let (Some(points_crs), Some(raster_crs)) = (self.points.crs(), raster.crs()) {
            if !points_crs.is_comparable(raster_crs) {
                warn!(
                    source,
                    raster_crs = %raster_crs,
                    points_crs = %points_crs,
                    "cannot compare CRS definitions, assuming they match"
                );
            } else if !points_crs.is_equivalent(raster_crs) {
                return Err(Error::RasterAlignment {
                    path: source.to_string(),
                    detail: format!(
                        "raster CRS {} differs from point CRS {}",
                        raster_crs, points_crs
                    ),
                });
            }
        }

        let sampled = zonal_statistic(raster, &self.points.footprints(), self.statistic);
        let missing: Vec<usize> = sampled
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| i)
            .collect();
        if let Some(&first) = missing.first() {
            return Err(Error::RasterAlignment {
                path: source.to_string(),
                detail: format!(
                    "{} of {} points have no valid pixel (first: point {})",
                    missing.len(),
                    sampled.len(),
                    first
                ),
            });
        }

        debug!(column = %column, source, rows = sampled.len(), "sampled band");
        self.bands.push(band.to_string());
        self.columns.push(sampled.into_iter().flatten().collect());
        Ok(())
    }

    /// Join the columns onto the point labels
    pub fn finish(self) -> Result<FeatureTable> {
        if self.points.is_empty() {
            return Err(Error::InsufficientData("no ground-truth points".into()));
        }
        if self.columns.is_empty() {
            return Err(Error::InsufficientData("no band columns".into()));
        }

        let n = self.points.len();
        let values = Array2::from_shape_fn((n, self.columns.len()), |(row, col)| {
            self.columns[col][row]
        });
        let schema = FeatureSchema::new(self.statistic, self.bands)?;
        FeatureTable::new(schema, self.points.labels(), values)
    }
}

/// Build the feature table for `points` from band files, in the given order
pub fn build_feature_table(
    points: &PointSet,
    bands: &[BandFile],
    statistic: ZonalStatistic,
) -> Result<FeatureTable> {
    let mut builder = FeatureTableBuilder::new(points, statistic);
    for band in bands {
        let raster: Raster<f64> = read_geotiff(&band.path)?;
        builder.add_band(&band.name, &band.path.display().to_string(), &raster)?;
    }
    let table = builder.finish()?;
    info!(
        rows = table.n_rows(),
        columns = table.n_columns(),
        statistic = %statistic,
        "built feature table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point};
    use landcover_core::vector::GroundTruthPoint;
    use landcover_core::{GeoTransform, CRS};

    fn band(offset: f64) -> Raster<f64> {
        let mut r = Raster::new(3, 3);
        r.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        for row in 0..3 {
            for col in 0..3 {
                r.set(row, col, offset + (row * 3 + col) as f64).unwrap();
            }
        }
        r
    }

    fn points(coords: &[(f64, f64, i64)]) -> PointSet {
        let points = coords
            .iter()
            .map(|&(x, y, label)| GroundTruthPoint {
                footprint: Geometry::Point(Point::new(x, y)),
                label,
            })
            .collect();
        PointSet::new(points, None)
    }

    #[test]
    fn test_builder_joins_columns_in_order() {
        let pts = points(&[(0.5, 2.5, 0), (2.5, 0.5, 1)]);
        let mut builder = FeatureTableBuilder::new(&pts, ZonalStatistic::Min);
        builder.add_band("B02", "B02.tif", &band(0.0)).unwrap();
        builder.add_band("B03", "B03.tif", &band(100.0)).unwrap();
        let table = builder.finish().unwrap();

        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names(), vec!["id", "min_B02", "min_B03"]);
        assert_eq!(table.labels(), &[0, 1]);
        assert_eq!(table.row(0).to_vec(), vec![0.0, 100.0]);
        assert_eq!(table.row(1).to_vec(), vec![8.0, 108.0]);
    }

    #[test]
    fn test_duplicate_band_rejected() {
        let pts = points(&[(0.5, 2.5, 0)]);
        let mut builder = FeatureTableBuilder::new(&pts, ZonalStatistic::Min);
        builder.add_band("B02", "a/B02.tif", &band(0.0)).unwrap();
        let err = builder.add_band("B02", "b/B02.tif", &band(0.0)).unwrap_err();
        match err {
            Error::DuplicateColumn { column, path } => {
                assert_eq!(column, "min_B02");
                assert_eq!(path, "b/B02.tif");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_uncovered_point_is_alignment_error() {
        let pts = points(&[(0.5, 2.5, 0), (10.0, 10.0, 1)]);
        let mut builder = FeatureTableBuilder::new(&pts, ZonalStatistic::Min);
        let err = builder.add_band("B02", "B02.tif", &band(0.0)).unwrap_err();
        assert!(matches!(err, Error::RasterAlignment { .. }));
    }

    #[test]
    fn test_crs_mismatch_is_alignment_error() {
        let pts = PointSet::new(
            vec![GroundTruthPoint {
                footprint: Geometry::Point(Point::new(0.5, 2.5)),
                label: 1,
            }],
            Some(CRS::from_epsg(32633)),
        );
        let mut raster = band(0.0);
        raster.set_crs(Some(CRS::from_epsg(32634)));
        let mut builder = FeatureTableBuilder::new(&pts, ZonalStatistic::Min);
        assert!(matches!(
            builder.add_band("B02", "B02.tif", &raster),
            Err(Error::RasterAlignment { .. })
        ));
    }

    #[test]
    fn test_empty_builder_is_insufficient() {
        let pts = points(&[(0.5, 2.5, 0)]);
        let builder = FeatureTableBuilder::new(&pts, ZonalStatistic::Min);
        assert!(matches!(builder.finish(), Err(Error::InsufficientData(_))));
    }

    #[test]
    fn test_schema_check_bands() {
        let schema =
            FeatureSchema::new(ZonalStatistic::Min, vec!["B02".into(), "B03".into()]).unwrap();
        assert!(schema.check_bands(&["B02", "B03"]).is_ok());
        assert!(matches!(
            schema.check_bands(&["B03", "B02"]),
            Err(Error::FeatureOrderMismatch { .. })
        ));
        assert!(schema.check_bands(&["B02"]).is_err());
        assert!(FeatureSchema::new(ZonalStatistic::Min, vec!["B02".into(), "B02".into()]).is_err());
    }

    #[test]
    fn test_records_follow_table_rows() {
        let schema = FeatureSchema::new(ZonalStatistic::Mean, vec!["B02".into()]).unwrap();
        let table = FeatureTable::new(
            schema,
            vec![3, 4],
            Array2::from_shape_vec((2, 1), vec![0.25, 0.5]).unwrap(),
        )
        .unwrap();
        assert_eq!(
            table.records(),
            vec![
                FeatureRecord { id: 3, features: vec![0.25] },
                FeatureRecord { id: 4, features: vec![0.5] },
            ]
        );
    }

    #[test]
    fn test_incomparable_crs_is_not_an_error() {
        let pts = PointSet::new(
            vec![GroundTruthPoint {
                footprint: Geometry::Point(Point::new(0.5, 2.5)),
                label: 1,
            }],
            Some(CRS::from_wkt(r#"PROJCS["Custom",PROJECTION["Mercator"]]"#)),
        );
        let mut raster = band(0.0);
        raster.set_crs(Some(CRS::from_epsg(32633)));
        let mut builder = FeatureTableBuilder::new(&pts, ZonalStatistic::Min);
        builder.add_band("B02", "B02.tif", &raster).unwrap();
        assert_eq!(builder.finish().unwrap().n_rows(), 1);
    }

    #[test]
    fn test_view_selects_rows() {
        let schema = FeatureSchema::new(ZonalStatistic::Min, vec!["B02".into()]).unwrap();
        let table = FeatureTable::new(
            schema,
            vec![0, 1, 2],
            Array2::from_shape_vec((3, 1), vec![10.0, 11.0, 12.0]).unwrap(),
        )
        .unwrap();
        let rows = [2, 0];
        let view = table.view(&rows);
        assert_eq!(view.len(), 2);
        assert_eq!(view.labels(), vec![2, 0]);
        assert_eq!(view.features().column(0).to_vec(), vec![12.0, 10.0]);
        assert_eq!(table.classes(), vec![0, 1, 2]);
    }
}
