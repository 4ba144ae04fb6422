//! Per-pixel scene classification
//!
//! A scene is a stack of co-registered band rasters. Its pixels are
//! flattened into an `(H * W) x N` feature matrix in row-major order, each
//! row is classified, and the labels are reshaped back onto the grid.

use crate::classification::{Classifier, FittedPipeline};
use crate::features::BandFile;
use crate::maybe_rayon::*;
use landcover_core::io::read_geotiff;
use landcover_core::{Error, Raster, RasterProfile, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters for [`classify_scene`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
    /// Label written to pixels with a non-finite or no-data band value
    pub nodata_label: u8,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self { nodata_label: 255 }
    }
}

/// One named band of a scene
#[derive(Debug, Clone)]
pub struct SceneBand {
    pub name: String,
    pub raster: Raster<f64>,
}

/// Co-registered bands of equal shape, in feature order
#[derive(Debug, Clone)]
pub struct SceneRaster {
    bands: Vec<SceneBand>,
}

impl SceneRaster {
    /// Stack bands; all must share the first band's shape
    pub fn new(bands: Vec<SceneBand>) -> Result<Self> {
        let first = bands
            .first()
            .ok_or_else(|| Error::InsufficientData("a scene needs at least one band".into()))?;
        let (rows, cols) = first.raster.shape();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        for band in &bands[1..] {
            let (r, c) = band.raster.shape();
            if (r, c) != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: r,
                    ac: c,
                });
            }
            if band.raster.transform() != first.raster.transform() {
                warn!(band = %band.name, "band transform differs from the first band");
            }
        }
        Ok(Self { bands })
    }

    /// Read band files in the given order
    pub fn from_files(files: &[BandFile]) -> Result<Self> {
        let bands = files
            .iter()
            .map(|file| {
                debug!(path = %file.path.display(), "reading scene band");
                Ok(SceneBand {
                    name: file.name.clone(),
                    raster: read_geotiff(&file.path)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(bands)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn n_bands(&self) -> usize {
        self.bands.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].raster.shape()
    }

    /// Georeferencing of the first band, which outputs inherit
    pub fn profile(&self) -> RasterProfile {
        self.bands[0].raster.profile()
    }

    /// `(H * W) x N` matrix: row `r * W + c` holds pixel `(r, c)` of every band
    pub fn flatten(&self) -> Array2<f64> {
        let (rows, cols) = self.shape();
        Array2::from_shape_fn((rows * cols, self.bands.len()), |(pixel, band)| {
            self.bands[band].raster.data()[[pixel / cols, pixel % cols]]
        })
    }

    /// Whether any band marks this flattened pixel as no-data
    fn is_masked(&self, row: ArrayView1<'_, f64>) -> bool {
        row.iter()
            .zip(&self.bands)
            .any(|(&v, band)| !v.is_finite() || band.raster.is_nodata(v))
    }
}

/// Reshape row-major labels back onto a `rows x cols` grid
pub fn reshape_labels(labels: Vec<u8>, rows: usize, cols: usize) -> Result<Array2<u8>> {
    let len = labels.len();
    Array2::from_shape_vec((rows, cols), labels).map_err(|_| Error::SizeMismatch {
        er: rows,
        ec: cols,
        ar: len,
        ac: 1,
    })
}

fn to_label(label: i64) -> Result<u8> {
    u8::try_from(label).map_err(|_| Error::InvalidParameter {
        name: "label",
        value: label.to_string(),
        reason: "class labels must fit in 0..=255 to be written as a u8 raster".into(),
    })
}

/// Classify every pixel of `scene` with `pipeline`.
///
/// The scene bands must match the pipeline's feature schema exactly, in
/// name and order. Pixels where any band is non-finite or no-data get
/// `params.nodata_label`, which then becomes the output's no-data value.
/// The output shares the scene's georeferencing.
pub fn classify_scene(
    pipeline: &FittedPipeline,
    scene: &SceneRaster,
    params: &InferenceParams,
) -> Result<Raster<u8>> {
    pipeline.schema().check_bands(&scene.band_names())?;

    let (rows, cols) = scene.shape();
    let features = scene.flatten();
    let nodata = params.nodata_label;

    let labels: Vec<Option<i64>> = (0..features.nrows())
        .into_par_iter()
        .map(|i| {
            let row = features.row(i);
            if scene.is_masked(row) {
                None
            } else {
                Some(pipeline.predict_row(row))
            }
        })
        .collect();

    let masked = labels.iter().filter(|l| l.is_none()).count();
    let pixels = labels
        .into_iter()
        .map(|label| match label {
            None => Ok(nodata),
            Some(label) => {
                let value = to_label(label)?;
                if masked > 0 && value == nodata {
                    return Err(Error::InvalidParameter {
                        name: "nodata_label",
                        value: nodata.to_string(),
                        reason: "collides with a predicted class label".into(),
                    });
                }
                Ok(value)
            }
        })
        .collect::<Result<Vec<u8>>>()?;

    let profile = scene.profile();
    let mut output = Raster::from_array(reshape_labels(pixels, rows, cols)?);
    output.set_transform(profile.transform);
    output.set_crs(profile.crs);
    if masked > 0 {
        output.set_nodata(Some(nodata));
    }

    info!(
        family = %pipeline.family(),
        rows,
        cols,
        masked,
        "classified scene"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{ClassifierFamily, HyperparameterGrid, ParamSet};
    use crate::features::FeatureSchema;
    use crate::statistics::ZonalStatistic;
    use landcover_core::{GeoTransform, CRS};
    use ndarray::array;

    fn band(name: &str, data: Array2<f64>) -> SceneBand {
        let mut raster = Raster::from_array(data);
        raster.set_transform(GeoTransform::new(500.0, 900.0, 10.0, -10.0));
        raster.set_crs(Some(CRS::from_epsg(32633)));
        SceneBand {
            name: name.to_string(),
            raster,
        }
    }

    /// 1-NN pipeline: label 1 where the first feature is large, else 0
    fn threshold_pipeline(bands: &[&str]) -> FittedPipeline {
        let schema = FeatureSchema::new(
            ZonalStatistic::Min,
            bands.iter().map(|b| b.to_string()).collect(),
        )
        .unwrap();
        let x = Array2::from_shape_fn((2, bands.len()), |(r, _)| r as f64 * 10.0);
        let mut params = ParamSet::new();
        params.insert("n_neighbors".into(), 1i64.into());
        let grid = HyperparameterGrid::new(ClassifierFamily::Knn, false);
        FittedPipeline::fit(&grid, params, schema, x.view(), &[0, 1], 0).unwrap()
    }

    #[test]
    fn test_flatten_is_row_major() {
        let scene = SceneRaster::new(vec![
            band("a", array![[1.0, 2.0], [3.0, 4.0]]),
            band("b", array![[10.0, 20.0], [30.0, 40.0]]),
        ])
        .unwrap();
        let flat = scene.flatten();
        assert_eq!(flat.dim(), (4, 2));
        assert_eq!(flat.row(1).to_vec(), vec![2.0, 20.0]);
        assert_eq!(flat.row(2).to_vec(), vec![3.0, 30.0]);

        let column: Vec<u8> = flat.column(0).iter().map(|&v| v as u8).collect();
        assert_eq!(reshape_labels(column, 2, 2).unwrap(), array![[1, 2], [3, 4]]);
    }

    #[test]
    fn test_flatten_and_reshape_single_row_column_and_rectangular() {
        for (rows, cols) in [(1, 5), (4, 1), (3, 5), (1, 1)] {
            let a = Array2::from_shape_fn((rows, cols), |(r, c)| (r * 10 + c) as f64);
            let b = a.mapv(|v| v + 100.0);
            let scene = SceneRaster::new(vec![band("a", a.clone()), band("b", b)]).unwrap();

            let flat = scene.flatten();
            assert_eq!(flat.dim(), (rows * cols, 2));
            for r in 0..rows {
                for c in 0..cols {
                    let v = (r * 10 + c) as f64;
                    assert_eq!(flat.row(r * cols + c).to_vec(), vec![v, v + 100.0]);
                }
            }

            let column: Vec<u8> = flat.column(0).iter().map(|&v| v as u8).collect();
            assert_eq!(
                reshape_labels(column, rows, cols).unwrap(),
                a.mapv(|v| v as u8),
                "{}x{}",
                rows,
                cols
            );

            let pipeline = threshold_pipeline(&["a", "b"]);
            let output = classify_scene(&pipeline, &scene, &InferenceParams::default()).unwrap();
            assert_eq!(output.shape(), (rows, cols));
        }
        assert!(reshape_labels(vec![0; 5], 5, 2).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let err = SceneRaster::new(vec![
            band("a", Array2::zeros((2, 2))),
            band("b", Array2::zeros((2, 3))),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
        assert!(SceneRaster::new(Vec::new()).is_err());
    }

    #[test]
    fn test_classify_keeps_georeferencing() {
        let scene = SceneRaster::new(vec![
            band("a", array![[0.0, 9.0], [1.0, 12.0]]),
            band("b", array![[0.0, 9.0], [1.0, 12.0]]),
        ])
        .unwrap();
        let pipeline = threshold_pipeline(&["a", "b"]);
        let output = classify_scene(&pipeline, &scene, &InferenceParams::default()).unwrap();

        assert_eq!(output.data(), &array![[0u8, 1], [0, 1]]);
        assert_eq!(output.transform(), &scene.profile().transform);
        assert_eq!(output.crs(), Some(&CRS::from_epsg(32633)));
        assert_eq!(output.nodata(), None);
    }

    #[test]
    fn test_nodata_pixels_get_nodata_label() {
        let mut a = band("a", array![[0.0, f64::NAN], [10.0, -9999.0]]);
        a.raster.set_nodata(Some(-9999.0));
        let scene = SceneRaster::new(vec![a]).unwrap();
        let pipeline = threshold_pipeline(&["a"]);
        let output = classify_scene(&pipeline, &scene, &InferenceParams { nodata_label: 200 }).unwrap();

        assert_eq!(output.data(), &array![[0u8, 200], [1, 200]]);
        assert_eq!(output.nodata(), Some(200));
    }

    #[test]
    fn test_band_order_mismatch() {
        let scene = SceneRaster::new(vec![
            band("b", Array2::zeros((2, 2))),
            band("a", Array2::zeros((2, 2))),
        ])
        .unwrap();
        let pipeline = threshold_pipeline(&["a", "b"]);
        let err = classify_scene(&pipeline, &scene, &InferenceParams::default()).unwrap_err();
        assert!(matches!(err, Error::FeatureOrderMismatch { .. }));
    }

    #[test]
    fn test_label_out_of_u8_range() {
        assert!(to_label(255).is_ok());
        assert!(to_label(256).is_err());
        assert!(to_label(-1).is_err());
    }
}
