//! Run configuration
//!
//! Every field has a default, so a configuration file only needs the
//! settings it changes.

use crate::classification::{Average, ClassifierFamily, HyperparameterGrid, SearchParams};
use crate::features::SplitParams;
use crate::inference::InferenceParams;
use crate::statistics::ZonalStatistic;
use landcover_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings for one extract / train / classify run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ground-truth attribute holding the integer class label
    pub label_field: String,
    /// Zonal statistic sampled from each band
    pub statistic: ZonalStatistic,
    pub split: SplitParams,
    pub search: SearchParams,
    /// Averaging for held-out precision, recall and F1
    pub average: Average,
    pub grids: BTreeMap<ClassifierFamily, HyperparameterGrid>,
    pub inference: InferenceParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label_field: "id".to_string(),
            statistic: ZonalStatistic::Min,
            split: SplitParams::default(),
            search: SearchParams::default(),
            average: Average::default(),
            grids: ClassifierFamily::ALL
                .iter()
                .map(|&f| (f, HyperparameterGrid::default_for(f)))
                .collect(),
            inference: InferenceParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Fail early on settings no run could use
    pub fn validate(&self) -> Result<()> {
        let fraction = self.split.train_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::InvalidParameter {
                name: "train_fraction",
                value: fraction.to_string(),
                reason: "must lie strictly between 0 and 1".into(),
            });
        }
        if self.search.factor < 2 {
            return Err(Error::InvalidParameter {
                name: "factor",
                value: self.search.factor.to_string(),
                reason: "must be at least 2".into(),
            });
        }
        if self.search.cv_folds < 2 {
            return Err(Error::InvalidParameter {
                name: "cv_folds",
                value: self.search.cv_folds.to_string(),
                reason: "must be at least 2".into(),
            });
        }
        for (family, grid) in &self.grids {
            if grid.family != *family {
                return Err(Error::InvalidParameter {
                    name: "grids",
                    value: family.to_string(),
                    reason: format!("entry holds a {} grid", grid.family),
                });
            }
        }
        Ok(())
    }

    /// Grid for one family
    pub fn grid(&self, family: ClassifierFamily) -> Result<&HyperparameterGrid> {
        self.grids.get(&family).ok_or_else(|| Error::InvalidParameter {
            name: "grids",
            value: family.to_string(),
            reason: "no hyperparameter grid configured".into(),
        })
    }
}
