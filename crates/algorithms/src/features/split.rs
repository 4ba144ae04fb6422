//! Random train/test partition

use super::table::{FeatureTable, FeatureTableView};
use landcover_core::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Parameters for [`train_test_split`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Fraction of rows sampled into the training set, in (0, 1)
    pub train_fraction: f64,
    /// Seed for the sampler; `None` draws fresh entropy
    pub seed: Option<u64>,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            seed: None,
        }
    }
}

/// Disjoint row indices covering the whole table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    train: Vec<usize>,
    test: Vec<usize>,
}

impl TrainTestSplit {
    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn test(&self) -> &[usize] {
        &self.test
    }

    pub fn train_view<'a>(&'a self, table: &'a FeatureTable) -> FeatureTableView<'a> {
        table.view(&self.train)
    }

    pub fn test_view<'a>(&'a self, table: &'a FeatureTable) -> FeatureTableView<'a> {
        table.view(&self.test)
    }
}

/// Sample `round(train_fraction * n)` rows without replacement into the
/// training set; the remaining rows, in table order, form the test set.
///
/// Both sets are always non-empty.
pub fn train_test_split(table: &FeatureTable, params: &SplitParams) -> Result<TrainTestSplit> {
    split_indices(table.n_rows(), params)
}

pub(crate) fn split_indices(n: usize, params: &SplitParams) -> Result<TrainTestSplit> {
    let fraction = params.train_fraction;
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(Error::InvalidParameter {
            name: "train_fraction",
            value: fraction.to_string(),
            reason: "must lie strictly between 0 and 1".into(),
        });
    }
    if n < 2 {
        return Err(Error::InsufficientData(format!(
            "cannot split {} row(s) into non-empty train and test sets",
            n
        )));
    }

    let train_len = ((fraction * n as f64).round() as usize).clamp(1, n - 1);
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut train = rand::seq::index::sample(&mut rng, n, train_len).into_vec();
    train.sort_unstable();

    let mut in_train = vec![false; n];
    for &i in &train {
        in_train[i] = true;
    }
    let test = (0..n).filter(|&i| !in_train[i]).collect();

    Ok(TrainTestSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(fraction: f64, seed: u64) -> SplitParams {
        SplitParams {
            train_fraction: fraction,
            seed: Some(seed),
        }
    }

    #[test]
    fn test_partition_sizes() {
        let split = split_indices(100, &seeded(0.8, 7)).unwrap();
        assert_eq!(split.train().len(), 80);
        assert_eq!(split.test().len(), 20);

        let mut all: Vec<usize> = split.train().iter().chain(split.test()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = split_indices(50, &seeded(0.7, 42)).unwrap();
        let b = split_indices(50, &seeded(0.7, 42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_both_sides_non_empty() {
        let split = split_indices(3, &seeded(0.99, 1)).unwrap();
        assert_eq!(split.train().len(), 2);
        assert_eq!(split.test().len(), 1);

        let split = split_indices(3, &seeded(0.01, 1)).unwrap();
        assert_eq!(split.train().len(), 1);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            split_indices(10, &seeded(1.0, 0)),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(split_indices(10, &seeded(0.0, 0)).is_err());
        assert!(split_indices(10, &seeded(f64::NAN, 0)).is_err());
        assert!(matches!(
            split_indices(1, &seeded(0.5, 0)),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_unseeded_split_is_valid() {
        let split = split_indices(10, &SplitParams::default()).unwrap();
        assert_eq!(split.train().len(), 8);
        assert_eq!(split.test().len(), 2);
    }
}
