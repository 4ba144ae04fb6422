//! Labeled feature tables built from ground-truth points and band rasters
//!
//! - **bands**: Band file discovery and column naming
//! - **table**: Feature schema, feature table and its builder
//! - **split**: Random train/test partition of a feature table

mod bands;
mod split;
mod table;

pub use bands::{discover_bands, BandFile};
pub use split::{train_test_split, SplitParams, TrainTestSplit};
pub use table::{
    build_feature_table, FeatureRecord, FeatureSchema, FeatureTable, FeatureTableBuilder,
    FeatureTableView, LABEL_COLUMN,
};
