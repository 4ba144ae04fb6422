//! I/O for the geospatial data the pipeline consumes and produces
//!
//! Rasters are single-band GeoTIFFs read and written with the pure-Rust
//! `tiff` crate. Ground-truth points are read from GeoJSON, see
//! [`crate::vector`].

mod geotiff;

pub use geotiff::{
    read_geotiff, read_geotiff_from_buffer, read_info, write_geotiff,
    write_geotiff_to_buffer, Compression, GeoTiffInfo, GeoTiffOptions,
};
