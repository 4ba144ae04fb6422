//! k-nearest-neighbor classification (brute force)

use super::params::{ParamReader, ParamSet};
use landcover_core::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::collections::BTreeSet;

/// How neighbors are weighted in the vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weights {
    Uniform,
    /// Inverse distance; neighbors at distance zero take the whole vote
    Distance,
}

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Euclidean,
    Manhattan,
    /// Minkowski distance of order `p >= 1`
    Minkowski(f64),
}

impl Metric {
    fn distance(self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(p, q)| (p - q).abs());
        match self {
            Metric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Metric::Manhattan => diffs.sum(),
            Metric::Minkowski(p) if p == 1.0 => diffs.sum(),
            Metric::Minkowski(p) if p == 2.0 => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Metric::Minkowski(p) => diffs.map(|d| d.powf(p)).sum::<f64>().powf(1.0 / p),
        }
    }
}

/// Parameters for k-NN
#[derive(Debug, Clone, PartialEq)]
pub struct KnnParams {
    /// Number of neighbors (default: 5)
    pub n_neighbors: usize,
    pub weights: Weights,
    pub metric: Metric,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: Weights::Uniform,
            metric: Metric::Minkowski(2.0),
        }
    }
}

impl KnnParams {
    /// Parse `n_neighbors`, `weights`, `metric` and `p`
    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let r = ParamReader::new(params, &["n_neighbors", "weights", "metric", "p"])?;

        let n_neighbors = r.usize_or("n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(r.invalid("n_neighbors", "must be at least 1"));
        }
        let weights = match r.str_or("weights", "uniform")? {
            "uniform" => Weights::Uniform,
            "distance" => Weights::Distance,
            _ => return Err(r.invalid("weights", "expected uniform or distance")),
        };
        let p = r.f64_or("p", 2.0)?;
        if !(p >= 1.0) {
            return Err(r.invalid("p", "must be at least 1"));
        }
        let metric = match r.str_or("metric", "minkowski")? {
            "euclidean" => Metric::Euclidean,
            "manhattan" | "cityblock" => Metric::Manhattan,
            "minkowski" => Metric::Minkowski(p),
            _ => return Err(r.invalid("metric", "expected euclidean, manhattan or minkowski")),
        };

        Ok(Self {
            n_neighbors,
            weights,
            metric,
        })
    }

    /// Store the training set; fails when there are fewer rows than neighbors
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<KnnModel> {
        if x.nrows() != y.len() {
            return Err(Error::SizeMismatch {
                er: y.len(),
                ec: x.ncols(),
                ar: x.nrows(),
                ac: x.ncols(),
            });
        }
        if self.n_neighbors > x.nrows() {
            return Err(Error::InvalidParameter {
                name: "n_neighbors",
                value: self.n_neighbors.to_string(),
                reason: format!("only {} training samples", x.nrows()),
            });
        }

        let classes: Vec<i64> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let targets = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        Ok(KnnModel {
            params: KnnSettings {
                n_neighbors: self.n_neighbors,
                weights: self.weights,
                metric: self.metric,
            },
            samples: x.to_owned(),
            targets,
            classes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct KnnSettings {
    n_neighbors: usize,
    weights: Weights,
    metric: Metric,
}

/// A fitted k-NN classifier
#[derive(Debug, Clone, PartialEq)]
pub struct KnnModel {
    params: KnnSettings,
    samples: Array2<f64>,
    /// Class index of each sample
    targets: Vec<usize>,
    classes: Vec<i64>,
}

impl KnnModel {
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Indices and distances of the k nearest samples, nearest first.
    ///
    /// Equal distances are ordered by sample index.
    pub fn neighbors(&self, row: ArrayView1<'_, f64>) -> Vec<(usize, f64)> {
        let mut dist: Vec<(usize, f64)> = self
            .samples
            .outer_iter()
            .map(|s| self.params.metric.distance(s, row))
            .enumerate()
            .collect();
        let k = self.params.n_neighbors.min(dist.len());
        let by_distance = |a: &(usize, f64), b: &(usize, f64)| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0));
        if k < dist.len() {
            dist.select_nth_unstable_by(k, by_distance);
            dist.truncate(k);
        }
        dist.sort_by(by_distance);
        dist
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        let neighbors = self.neighbors(row);
        let mut votes = vec![0.0; self.classes.len()];

        match self.params.weights {
            Weights::Uniform => {
                for (i, _) in &neighbors {
                    votes[self.targets[*i]] += 1.0;
                }
            }
            Weights::Distance => {
                let exact = neighbors.iter().any(|(_, d)| *d == 0.0);
                for (i, d) in &neighbors {
                    let w = if exact {
                        if *d == 0.0 {
                            1.0
                        } else {
                            0.0
                        }
                    } else {
                        1.0 / d
                    };
                    votes[self.targets[*i]] += w;
                }
            }
        }

        let mut best = 0;
        for (c, &v) in votes.iter().enumerate() {
            if v > votes[best] {
                best = c;
            }
        }
        self.classes[best]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn knn(k: usize, weights: Weights, metric: Metric) -> KnnParams {
        KnnParams {
            n_neighbors: k,
            weights,
            metric,
        }
    }

    #[test]
    fn test_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_relative_eq!(Metric::Euclidean.distance(a.view(), b.view()), 5.0);
        assert_relative_eq!(Metric::Manhattan.distance(a.view(), b.view()), 7.0);
        assert_relative_eq!(Metric::Minkowski(2.0).distance(a.view(), b.view()), 5.0);
        assert_relative_eq!(
            Metric::Minkowski(3.0).distance(a.view(), b.view()),
            91f64.powf(1.0 / 3.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_one_neighbor_memorizes() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [5, 6, 5, 6];
        let model = knn(1, Weights::Uniform, Metric::Euclidean).fit(x.view(), &y).unwrap();
        for (row, &label) in x.outer_iter().zip(&y) {
            assert_eq!(model.predict_row(row), label);
        }
    }

    #[test]
    fn test_uniform_tie_goes_to_smaller_label() {
        let x = array![[0.0], [2.0]];
        let model = knn(2, Weights::Uniform, Metric::Euclidean)
            .fit(x.view(), &[9, 3])
            .unwrap();
        assert_eq!(model.predict_row(array![1.0].view()), 3);
    }

    #[test]
    fn test_distance_weights() {
        let x = array![[0.0], [1.0], [1.2]];
        let y = [0, 1, 1];
        let model = knn(3, Weights::Distance, Metric::Euclidean).fit(x.view(), &y).unwrap();
        // 1/0.1 beats 1/0.9 + 1/1.1
        assert_eq!(model.predict_row(array![0.1].view()), 0);
        // Exact match takes the whole vote
        assert_eq!(model.predict_row(array![0.0].view()), 0);
    }

    #[test]
    fn test_too_few_samples() {
        let x = array![[0.0], [1.0]];
        let err = knn(3, Weights::Uniform, Metric::Euclidean).fit(x.view(), &[0, 1]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "n_neighbors", .. }));
    }

    #[test]
    fn test_neighbors_sorted() {
        let x = array![[5.0], [1.0], [3.0], [1.0]];
        let model = knn(3, Weights::Uniform, Metric::Manhattan)
            .fit(x.view(), &[0, 0, 0, 0])
            .unwrap();
        let idx: Vec<usize> = model.neighbors(array![0.0].view()).iter().map(|n| n.0).collect();
        assert_eq!(idx, vec![1, 3, 2]);
    }

    #[test]
    fn test_from_params() {
        let mut set = ParamSet::new();
        set.insert("n_neighbors".into(), 4i64.into());
        set.insert("weights".into(), "distance".into());
        set.insert("metric".into(), "manhattan".into());
        let p = KnnParams::from_params(&set).unwrap();
        assert_eq!(p, knn(4, Weights::Distance, Metric::Manhattan));

        set.insert("n_neighbors".into(), 0i64.into());
        assert!(KnnParams::from_params(&set).is_err());
    }
}
