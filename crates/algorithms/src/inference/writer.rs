//! Writing classified rasters

use landcover_core::io::{write_geotiff, Compression, GeoTiffOptions};
use landcover_core::{DataType, Error, Raster, RasterProfile, Result};
use std::path::Path;
use tracing::info;

/// Write a label grid as a single-band, LZW-compressed `u8` GeoTIFF.
///
/// Transform and CRS come from `reference`, the profile of the scene the
/// labels were predicted from, GeoKeys and rotation terms included; the
/// no-data value is the prediction's own.
/// The grid must have the reference's shape.
pub fn write_prediction<P: AsRef<Path>>(
    prediction: &Raster<u8>,
    reference: &RasterProfile,
    path: P,
) -> Result<()> {
    let (rows, cols) = prediction.shape();
    if (rows, cols) != reference.shape() {
        return Err(Error::SizeMismatch {
            er: reference.rows,
            ec: reference.cols,
            ar: rows,
            ac: cols,
        });
    }

    let mut output = prediction.clone();
    output.set_transform(reference.transform);
    output.set_crs(reference.crs.clone());

    let options = GeoTiffOptions {
        compression: Compression::Lzw,
        data_type: Some(DataType::UInt8),
    };
    write_geotiff(&output, path.as_ref(), Some(options))?;
    info!(path = %path.as_ref().display(), rows, cols, "wrote classification");
    Ok(())
}
