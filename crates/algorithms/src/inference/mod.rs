//! Scene inference and classified raster output
//!
//! - **scene**: Band stacking, flattening and per-pixel prediction
//! - **writer**: Single-band `u8` GeoTIFF output on the scene's grid

mod scene;
mod writer;

pub use scene::{classify_scene, reshape_labels, InferenceParams, SceneBand, SceneRaster};
pub use writer::write_prediction;
