//! Random forest classification
//!
//! Bagged CART trees split on Gini impurity, each split drawn from a random
//! subset of `max_features` features. Prediction averages the class
//! probabilities of all trees.

use super::params::{ParamReader, ParamSet, ParamValue};
use crate::maybe_rayon::*;
use landcover_core::{Error, Result};
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Number of features considered at each split
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`; `auto` is accepted as an alias
    Sqrt,
    /// `floor(log2(n_features))`
    Log2,
    All,
    Count(usize),
    /// Fraction of the features in (0, 1]
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve against the number of features, at least 1
    pub fn resolve(self, n_features: usize) -> Result<usize> {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(k) => {
                if k == 0 || k > n_features {
                    return Err(Error::InvalidParameter {
                        name: "max_features",
                        value: k.to_string(),
                        reason: format!("must lie in 1..={}", n_features),
                    });
                }
                k
            }
            MaxFeatures::Fraction(f) => {
                if !(f > 0.0 && f <= 1.0) {
                    return Err(Error::InvalidParameter {
                        name: "max_features",
                        value: f.to_string(),
                        reason: "fraction must lie in (0, 1]".into(),
                    });
                }
                (f * n_features as f64) as usize
            }
        };
        Ok(k.max(1))
    }
}

/// Parameters for random forest training
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    /// Number of trees (default: 100)
    pub n_estimators: usize,
    pub max_features: MaxFeatures,
    /// Maximum tree depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node (default: 2)
    pub min_samples_split: usize,
    /// Draw a bootstrap sample per tree (default: true)
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
        }
    }
}

impl ForestParams {
    /// Parse `n_estimators`, `max_features`, `max_depth`, `min_samples_split`
    /// and `bootstrap` (0 or 1)
    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let r = ParamReader::new(
            params,
            &["n_estimators", "max_features", "max_depth", "min_samples_split", "bootstrap"],
        )?;
        let defaults = Self::default();

        let n_estimators = r.usize_or("n_estimators", defaults.n_estimators)?;
        if n_estimators == 0 {
            return Err(r.invalid("n_estimators", "must be at least 1"));
        }

        let max_features = match r.raw("max_features") {
            None => defaults.max_features,
            Some(ParamValue::Text(s)) => match s.as_str() {
                "auto" | "sqrt" => MaxFeatures::Sqrt,
                "log2" => MaxFeatures::Log2,
                "all" | "none" => MaxFeatures::All,
                _ => return Err(r.invalid("max_features", "expected auto, sqrt, log2, all, an integer or a fraction")),
            },
            Some(ParamValue::Int(k)) => MaxFeatures::Count(
                usize::try_from(*k).map_err(|_| r.invalid("max_features", "must be positive"))?,
            ),
            Some(ParamValue::Float(f)) => MaxFeatures::Fraction(*f),
        };

        let max_depth = match r.raw("max_depth") {
            Some(_) => Some(r.usize_or("max_depth", 0)?),
            None => None,
        };
        let min_samples_split = r.usize_or("min_samples_split", defaults.min_samples_split)?;
        if min_samples_split < 2 {
            return Err(r.invalid("min_samples_split", "must be at least 2"));
        }
        let bootstrap = r.usize_or("bootstrap", 1)? != 0;

        Ok(Self {
            n_estimators,
            max_features,
            max_depth,
            min_samples_split,
            bootstrap,
        })
    }

    /// Grow the forest; the same seed always grows the same trees
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &[i64], seed: u64) -> Result<RandomForest> {
        let (n, n_features) = x.dim();
        if n != y.len() {
            return Err(Error::SizeMismatch {
                er: y.len(),
                ec: n_features,
                ar: n,
                ac: n_features,
            });
        }
        if n == 0 {
            return Err(Error::InsufficientData("random forest needs training samples".into()));
        }
        let max_features = self.max_features.resolve(n_features)?;

        let classes: Vec<i64> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let targets: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        let mut master = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.gen()).collect();

        let grower = TreeGrower {
            x,
            targets: &targets,
            n_classes: classes.len(),
            max_features,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
        };
        let bootstrap = self.bootstrap;
        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let samples: Vec<usize> = if bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                grower.grow(samples, &mut rng)
            })
            .collect();

        Ok(RandomForest { classes, trees })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        /// Class probabilities
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single CART tree stored as a flat node list, root first
#[derive(Debug, Clone, PartialEq)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn distribution(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct TreeGrower<'a, 'b> {
    x: ArrayView2<'a, f64>,
    targets: &'b [usize],
    n_classes: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / t).powi(2)).sum::<f64>()
}

impl TreeGrower<'_, '_> {
    fn grow(&self, samples: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut tree = DecisionTree { nodes: Vec::new() };
        self.build(&mut tree, samples, 0, rng);
        tree
    }

    fn counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &s in samples {
            counts[self.targets[s]] += 1;
        }
        counts
    }

    /// Append the subtree for `samples` and return its node index
    fn build(&self, tree: &mut DecisionTree, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.counts(&samples);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);

        let split = if pure || depth_reached || samples.len() < self.min_samples_split {
            None
        } else {
            self.best_split(&samples, &counts, rng)
        };

        let index = tree.nodes.len();
        let Some(split) = split else {
            let total = samples.len().max(1) as f64;
            tree.nodes.push(Node::Leaf {
                distribution: counts.iter().map(|&c| c as f64 / total).collect(),
            });
            return index;
        };

        // Placeholder until both children exist
        tree.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });
        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.x[[s, split.feature]] <= split.threshold);
        let left = self.build(tree, left_samples, depth + 1, rng);
        let right = self.build(tree, right_samples, depth + 1, rng);
        tree.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&self, samples: &[usize], counts: &[usize], rng: &mut StdRng) -> Option<SplitChoice> {
        let n = samples.len();
        let parent = gini(counts, n);
        let features = rand::seq::index::sample(rng, self.x.ncols(), self.max_features);

        let mut best: Option<SplitChoice> = None;
        let mut order: Vec<usize> = samples.to_vec();
        for feature in features.iter() {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = vec![0usize; self.n_classes];
            let mut right = counts.to_vec();
            for i in 0..n - 1 {
                let class = self.targets[order[i]];
                left[class] += 1;
                right[class] -= 1;

                let here = self.x[[order[i], feature]];
                let next = self.x[[order[i + 1], feature]];
                if next <= here {
                    continue;
                }
                let n_left = i + 1;
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + (n - n_left) as f64 * gini(&right, n - n_left))
                    / n as f64;
                if impurity < parent - 1e-12 && best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

/// A fitted random forest
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    classes: Vec<i64>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean class probabilities over all trees
    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                *p += d;
            }
        }
        let n = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        let proba = self.predict_proba(row);
        let mut best = 0;
        for (c, &p) in proba.iter().enumerate() {
            if p > proba[best] {
                best = c;
            }
        }
        self.classes[best]
    }
}
