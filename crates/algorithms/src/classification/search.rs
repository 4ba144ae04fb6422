//! Successive-halving hyperparameter search
//!
//! Every candidate of a grid is scored by stratified k-fold cross-validated
//! accuracy on a small random subsample of the training rows. The best
//! `1 / factor` of the candidates survive into the next round, which uses
//! `factor` times as many rows, until one round has run on (up to) all rows
//! or too few candidates remain. Candidates that fail to fit score NaN and
//! rank last.

use super::metrics::accuracy;
use super::model::{Classifier, Predictor};
use super::params::{format_params, HyperparameterGrid, ParamSet};
use crate::maybe_rayon::*;
use landcover_core::{Error, Result};
use ndarray::{ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Parameters for [`halving_search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Survivor ratio and resource growth per round (default: 3)
    pub factor: usize,
    /// Number of cross-validation folds (default: 5)
    pub cv_folds: usize,
    /// Seed for row subsampling and forest growth
    pub random_state: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            factor: 3,
            cv_folds: 5,
            random_state: 0,
        }
    }
}

/// Score of one candidate in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ParamSet,
    /// Mean fold accuracy; NaN when any fold failed to fit
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
    /// Fit error message of the first failing fold
    pub error: Option<String>,
}

/// One round of the search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRound {
    pub iteration: usize,
    /// Number of training rows used
    pub n_resources: usize,
    pub scores: Vec<CandidateScore>,
}

/// Result of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best_params: ParamSet,
    pub best_score: f64,
    pub rounds: Vec<SearchRound>,
}

/// Row schedule of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalvingSchedule {
    pub min_resources: usize,
    pub max_resources: usize,
    pub n_iterations: usize,
}

impl HalvingSchedule {
    /// Plan the rounds for `n_candidates` over `n_samples` rows with
    /// `n_classes` classes.
    ///
    /// The first round uses as many rows as possible while still leaving
    /// enough rounds to narrow the candidates down to about one, and never
    /// fewer than `2 * cv_folds * n_classes` rows.
    pub fn new(
        n_candidates: usize,
        n_samples: usize,
        n_classes: usize,
        params: &SearchParams,
    ) -> Result<Self> {
        let factor = params.factor;
        if factor < 2 {
            return Err(Error::InvalidParameter {
                name: "factor",
                value: factor.to_string(),
                reason: "must be at least 2".into(),
            });
        }
        if params.cv_folds < 2 {
            return Err(Error::InvalidParameter {
                name: "cv_folds",
                value: params.cv_folds.to_string(),
                reason: "must be at least 2".into(),
            });
        }

        let smallest = 2 * params.cv_folds * n_classes.max(1);
        let n_required = 1 + floor_log(n_candidates, factor);
        let min_resources = smallest.max(n_samples / factor.pow(n_required as u32 - 1));
        if min_resources > n_samples {
            return Err(Error::InsufficientData(format!(
                "the search needs at least {} training rows ({} folds x 2 x {} classes), got {}",
                min_resources, params.cv_folds, n_classes, n_samples
            )));
        }
        let n_possible = 1 + floor_log(n_samples / min_resources, factor);

        Ok(Self {
            min_resources,
            max_resources: n_samples,
            n_iterations: n_possible.min(n_required),
        })
    }

    /// Rows used in round `iteration`
    pub fn resources(&self, iteration: usize, factor: usize) -> usize {
        let grown = factor
            .checked_pow(iteration as u32)
            .and_then(|f| f.checked_mul(self.min_resources))
            .unwrap_or(usize::MAX);
        grown.min(self.max_resources)
    }
}

/// Largest `k` with `base^k <= n` (0 for `n < base`)
fn floor_log(n: usize, base: usize) -> usize {
    let mut k = 0;
    let mut power = base;
    while power <= n {
        k += 1;
        match power.checked_mul(base) {
            Some(p) => power = p,
            None => break,
        }
    }
    k
}

/// Test-fold indices of a stratified k-fold partition, without shuffling.
///
/// Labels are taken in order of first appearance; within each label the
/// samples, in data order, fill folds `0, 1, ...` in contiguous blocks whose
/// sizes balance every fold's class mix.
pub fn stratified_folds(y: &[i64], n_splits: usize) -> Result<Vec<Vec<usize>>> {
    if n_splits < 2 {
        return Err(Error::InvalidParameter {
            name: "cv_folds",
            value: n_splits.to_string(),
            reason: "must be at least 2".into(),
        });
    }
    if y.len() < n_splits {
        return Err(Error::InsufficientData(format!(
            "cannot make {} folds from {} samples",
            n_splits,
            y.len()
        )));
    }

    // Encode labels by first appearance
    let mut codes: BTreeMap<i64, usize> = BTreeMap::new();
    let mut encoded = Vec::with_capacity(y.len());
    for &label in y {
        let next = codes.len();
        encoded.push(*codes.entry(label).or_insert(next));
    }
    let n_classes = codes.len();

    let mut class_counts = vec![0usize; n_classes];
    for &c in &encoded {
        class_counts[c] += 1;
    }
    if class_counts.iter().all(|&c| c < n_splits) {
        return Err(Error::InsufficientData(format!(
            "{} folds exceed the size of every class",
            n_splits
        )));
    }

    // allocation[fold][class] = count of class in y_sorted[fold::n_splits]
    let mut sorted = encoded.clone();
    sorted.sort_unstable();
    let mut allocation = vec![vec![0usize; n_classes]; n_splits];
    for (i, &c) in sorted.iter().enumerate() {
        allocation[i % n_splits][c] += 1;
    }

    let mut folds = vec![Vec::new(); n_splits];
    let fold_of_class: Vec<Vec<usize>> = (0..n_classes)
        .map(|c| {
            (0..n_splits)
                .flat_map(|f| std::iter::repeat(f).take(allocation[f][c]))
                .collect()
        })
        .collect();
    let mut seen = vec![0usize; n_classes];
    for (i, &c) in encoded.iter().enumerate() {
        let fold = fold_of_class[c][seen[c]];
        seen[c] += 1;
        folds[fold].push(i);
    }
    Ok(folds)
}

/// Mean accuracy of one candidate over stratified folds
fn cross_validate(
    grid: &HyperparameterGrid,
    params: &ParamSet,
    x: ArrayView2<'_, f64>,
    y: &[i64],
    folds: &[Vec<usize>],
    seed: u64,
) -> CandidateScore {
    let mut fold_scores = Vec::with_capacity(folds.len());
    let mut error = None;

    for (k, test) in folds.iter().enumerate() {
        let train: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != k)
            .flat_map(|(_, f)| f.iter().copied())
            .collect();
        let x_train = x.select(Axis(0), &train);
        let y_train: Vec<i64> = train.iter().map(|&i| y[i]).collect();

        let fitted = Predictor::fit(grid.family, grid.standardize, params, x_train.view(), &y_train, seed);
        match fitted {
            Ok(predictor) => {
                let x_test = x.select(Axis(0), test);
                let y_test: Vec<i64> = test.iter().map(|&i| y[i]).collect();
                let predicted = predictor.predict(x_test.view());
                fold_scores.push(accuracy(&y_test, &predicted).unwrap_or(f64::NAN));
            }
            Err(e) => {
                fold_scores.push(f64::NAN);
                error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len().max(1) as f64;
    CandidateScore {
        params: params.clone(),
        mean_score,
        fold_scores,
        error,
    }
}

/// Candidate indices ordered best first; NaN scores last, ties by grid order
fn ranking(scores: &[CandidateScore]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a].mean_score, scores[b].mean_score);
        match (sa.is_nan(), sb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => sb.total_cmp(&sa),
        }
    });
    order
}

/// Search `grid` on rows `x` labeled `y`.
///
/// Returns the best parameters of the final round; fails when the grid is
/// empty, the data too small for the schedule, or every final candidate
/// failed to fit.
pub fn halving_search(
    grid: &HyperparameterGrid,
    x: ArrayView2<'_, f64>,
    y: &[i64],
    params: &SearchParams,
) -> Result<SearchOutcome> {
    if x.nrows() != y.len() {
        return Err(Error::SizeMismatch {
            er: y.len(),
            ec: x.ncols(),
            ar: x.nrows(),
            ac: x.ncols(),
        });
    }
    let mut candidates = grid.candidates();
    if candidates.is_empty() {
        return Err(Error::InvalidParameter {
            name: "grid",
            value: grid.family.to_string(),
            reason: "a parameter has no candidate values".into(),
        });
    }

    let n_classes = {
        let mut labels = y.to_vec();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    };
    let schedule = HalvingSchedule::new(candidates.len(), y.len(), n_classes, params)?;
    info!(
        family = %grid.family,
        candidates = candidates.len(),
        rounds = schedule.n_iterations,
        min_rows = schedule.min_resources,
        "starting successive halving"
    );

    let mut rng = StdRng::seed_from_u64(params.random_state);
    let mut rounds = Vec::with_capacity(schedule.n_iterations);

    for iteration in 0..schedule.n_iterations {
        let n_resources = schedule.resources(iteration, params.factor);
        let mut rows = if n_resources < y.len() {
            rand::seq::index::sample(&mut rng, y.len(), n_resources).into_vec()
        } else {
            (0..y.len()).collect()
        };
        rows.sort_unstable();
        let x_round = x.select(Axis(0), &rows);
        let y_round: Vec<i64> = rows.iter().map(|&i| y[i]).collect();
        let folds = stratified_folds(&y_round, params.cv_folds)?;

        let seed = params.random_state;
        let scores: Vec<CandidateScore> = candidates
            .par_iter()
            .map(|candidate| cross_validate(grid, candidate, x_round.view(), &y_round, &folds, seed))
            .collect();

        for score in scores.iter().filter(|s| s.error.is_some()) {
            warn!(
                params = %format_params(&score.params),
                error = score.error.as_deref().unwrap_or_default(),
                "candidate failed to fit; scored NaN"
            );
        }

        let order = ranking(&scores);
        let keep = candidates.len().div_ceil(params.factor);
        debug!(
            iteration,
            n_resources,
            candidates = candidates.len(),
            keep,
            best = scores[order[0]].mean_score,
            "search round finished"
        );

        let survivors: Vec<ParamSet> = order
            .iter()
            .take(keep)
            .map(|&i| candidates[i].clone())
            .collect();
        let last = iteration + 1 == schedule.n_iterations;
        rounds.push(SearchRound {
            iteration,
            n_resources,
            scores,
        });
        if !last {
            candidates = survivors;
        }
    }

    let final_round = rounds
        .last()
        .ok_or_else(|| Error::Algorithm("the search ran no rounds".into()))?;
    let best = ranking(&final_round.scores)
        .first()
        .map(|&i| &final_round.scores[i])
        .filter(|s| !s.mean_score.is_nan())
        .ok_or_else(|| {
            Error::Algorithm(format!("every {} candidate failed to fit", grid.family))
        })?;

    info!(
        family = %grid.family,
        params = %format_params(&best.params),
        score = best.mean_score,
        "search finished"
    );
    Ok(SearchOutcome {
        best_params: best.params.clone(),
        best_score: best.mean_score,
        rounds,
    })
}
