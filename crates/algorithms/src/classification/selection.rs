//! Model selection and held-out evaluation

use super::metrics::{evaluate_predictions, Average, EvaluationMetrics};
use super::model::{Classifier, FittedPipeline};
use super::params::{ClassifierFamily, HyperparameterGrid, ParamSet};
use super::search::{halving_search, SearchParams, SearchRound};
use crate::features::FeatureTableView;
use landcover_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// The winner of a search, refit on all training rows
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub pipeline: FittedPipeline,
    pub best_params: ParamSet,
    /// Mean cross-validated accuracy of the winner in the final round
    pub best_score: f64,
    pub rounds: Vec<SearchRound>,
}

/// Search `grid` on the training rows and refit the winner on all of them
pub fn select_model(
    train: &FeatureTableView<'_>,
    grid: &HyperparameterGrid,
    search: &SearchParams,
) -> Result<ModelSelection> {
    let x = train.features();
    let y = train.labels();
    let outcome = halving_search(grid, x.view(), &y, search)?;
    let pipeline = FittedPipeline::fit(
        grid,
        outcome.best_params.clone(),
        train.schema().clone(),
        x.view(),
        &y,
        search.random_state,
    )?;
    Ok(ModelSelection {
        pipeline,
        best_params: outcome.best_params,
        best_score: outcome.best_score,
        rounds: outcome.rounds,
    })
}

/// Score a fitted pipeline on held-out rows
pub fn evaluate(
    pipeline: &FittedPipeline,
    test: &FeatureTableView<'_>,
    average: Average,
) -> Result<EvaluationMetrics> {
    let x = test.features();
    let predicted = pipeline.predict_checked(test.schema(), x.view())?;
    evaluate_predictions(&test.labels(), &predicted, average)
}

/// Selection and evaluation of one family
#[derive(Debug, Clone)]
pub struct FamilyReport {
    pub selection: ModelSelection,
    pub metrics: EvaluationMetrics,
}

/// Serializable summary of a [`FamilyReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySummary {
    pub family: ClassifierFamily,
    pub best_params: ParamSet,
    pub best_score: f64,
    pub metrics: EvaluationMetrics,
}

impl FamilyReport {
    pub fn family(&self) -> ClassifierFamily {
        self.selection.pipeline.family()
    }

    pub fn summary(&self) -> FamilySummary {
        FamilySummary {
            family: self.family(),
            best_params: self.selection.best_params.clone(),
            best_score: self.selection.best_score,
            metrics: self.metrics.clone(),
        }
    }
}

/// Select and evaluate every requested family, in order.
///
/// Each family uses its grid from `grids`; a missing grid is an error.
pub fn select_families(
    train: &FeatureTableView<'_>,
    test: &FeatureTableView<'_>,
    families: &[ClassifierFamily],
    grids: &BTreeMap<ClassifierFamily, HyperparameterGrid>,
    search: &SearchParams,
    average: Average,
) -> Result<Vec<FamilyReport>> {
    families
        .iter()
        .map(|family| {
            let grid = grids.get(family).ok_or_else(|| Error::InvalidParameter {
                name: "grids",
                value: family.to_string(),
                reason: "no hyperparameter grid configured".into(),
            })?;
            let selection = select_model(train, grid, search)?;
            let metrics = evaluate(&selection.pipeline, test, average)?;
            info!(
                family = %family,
                cv_accuracy = selection.best_score,
                test_accuracy = metrics.accuracy,
                precision = metrics.precision,
                recall = metrics.recall,
                f1 = metrics.f1,
                classes = ?selection.pipeline.classes(),
                "evaluated model"
            );
            Ok(FamilyReport { selection, metrics })
        })
        .collect()
}
