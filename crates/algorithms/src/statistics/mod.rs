//! Statistical summaries of raster data
//!
//! - **zonal**: Statistics of the pixels under vector footprints

pub mod zonal;

pub use zonal::{footprint_cells, footprint_statistics, zonal_statistic, ZonalResult, ZonalStatistic};
