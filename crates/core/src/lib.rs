//! # Landcover Core
//!
//! Core types and I/O for the landcover classification workspace.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `RasterProfile`: The georeferencing a raster shares with derived outputs
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - Single-band GeoTIFF reading and writing
//! - GeoJSON and Shapefile ground-truth point reading

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::{GeoKeys, CRS};
pub use error::{Error, Result};
pub use raster::{DataType, GeoTransform, Raster, RasterElement, RasterProfile};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{DataType, GeoTransform, Raster, RasterElement, RasterProfile};
    pub use crate::vector::{GroundTruthPoint, PointSet};
}
