//! # Landcover Algorithms
//!
//! Supervised land-cover classification of multispectral rasters.
//!
//! ## Modules
//!
//! - **statistics**: Zonal statistics of band pixels under ground-truth footprints
//! - **features**: Labeled feature tables and train/test splitting
//! - **classification**: SVM, k-NN and random forest with successive-halving model selection
//! - **inference**: Per-pixel scene classification and `u8` GeoTIFF output
//! - **config**: Run configuration

pub mod classification;
pub mod config;
pub mod features;
pub mod inference;
mod maybe_rayon;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        evaluate, select_families, select_model, Average, Classifier, ClassifierFamily,
        EvaluationMetrics, FamilyReport, FittedPipeline, HyperparameterGrid, ParamSet,
        ParamValue, SearchParams,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::features::{
        build_feature_table, discover_bands, train_test_split, BandFile, FeatureSchema,
        FeatureTable, SplitParams, TrainTestSplit,
    };
    pub use crate::inference::{classify_scene, write_prediction, InferenceParams, SceneRaster};
    pub use crate::statistics::ZonalStatistic;
    pub use landcover_core::prelude::*;
}
