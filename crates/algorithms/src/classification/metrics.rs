//! Classification metrics
//!
//! Accuracy plus precision, recall and F1 under a selectable averaging
//! mode. Any ratio whose denominator is zero counts as 0.

use landcover_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How per-class precision/recall/F1 are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    /// Score only `pos_label`; valid for at most two distinct labels
    Binary { pos_label: i64 },
    /// Global counts of true positives, false positives and false negatives
    Micro,
    /// Unweighted mean over labels
    Macro,
    /// Mean over labels weighted by true-label support
    Weighted,
}

impl Default for Average {
    fn default() -> Self {
        Average::Binary { pos_label: 1 }
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Average::Binary { pos_label } => write!(f, "binary (positive label {})", pos_label),
            Average::Micro => f.write_str("micro"),
            Average::Macro => f.write_str("macro"),
            Average::Weighted => f.write_str("weighted"),
        }
    }
}

/// Counts of (true label, predicted label) pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Union of true and predicted labels, ascending
    labels: Vec<i64>,
    /// `counts[[t, p]]`: samples of label `labels[t]` predicted as `labels[p]`
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn new(y_true: &[i64], y_pred: &[i64]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;
        let labels: Vec<i64> = y_true
            .iter()
            .chain(y_pred)
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = |label: &i64| labels.binary_search(label).unwrap_or_default();

        let mut counts = Array2::<usize>::zeros((labels.len(), labels.len()));
        for (t, p) in y_true.iter().zip(y_pred) {
            counts[[index(t), index(p)]] += 1;
        }
        Ok(Self { labels, counts })
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    fn true_positives(&self, k: usize) -> usize {
        self.counts[[k, k]]
    }

    fn false_positives(&self, k: usize) -> usize {
        self.counts.column(k).sum() - self.counts[[k, k]]
    }

    fn false_negatives(&self, k: usize) -> usize {
        self.counts.row(k).sum() - self.counts[[k, k]]
    }

    fn support(&self, k: usize) -> usize {
        self.counts.row(k).sum()
    }
}

/// Held-out performance of one fitted pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub average: Average,
    pub confusion: ConfusionMatrix,
}

fn check_lengths(y_true: &[i64], y_pred: &[i64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(Error::InvalidParameter {
            name: "y_pred",
            value: y_pred.len().to_string(),
            reason: format!("expected {} predictions", y_true.len()),
        });
    }
    if y_true.is_empty() {
        return Err(Error::InsufficientData("no samples to score".into()));
    }
    Ok(())
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fraction of predictions equal to the true label
pub fn accuracy(y_true: &[i64], y_pred: &[i64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(ratio(correct, y_true.len()))
}

/// (precision, recall, f1) from raw counts
fn prf(tp: usize, fp: usize, fn_: usize) -> (f64, f64, f64) {
    (ratio(tp, tp + fp), ratio(tp, tp + fn_), ratio(2 * tp, 2 * tp + fp + fn_))
}

/// Score predictions against true labels
pub fn evaluate_predictions(
    y_true: &[i64],
    y_pred: &[i64],
    average: Average,
) -> Result<EvaluationMetrics> {
    let confusion = ConfusionMatrix::new(y_true, y_pred)?;
    let accuracy = ratio(
        (0..confusion.labels.len()).map(|k| confusion.true_positives(k)).sum(),
        confusion.total(),
    );
    let n_labels = confusion.labels.len();

    let (precision, recall, f1) = match average {
        Average::Binary { pos_label } => {
            if n_labels > 2 {
                return Err(Error::InvalidParameter {
                    name: "average",
                    value: "binary".into(),
                    reason: format!(
                        "found {} distinct labels; choose micro, macro or weighted averaging",
                        n_labels
                    ),
                });
            }
            match confusion.labels.binary_search(&pos_label) {
                Ok(k) => prf(
                    confusion.true_positives(k),
                    confusion.false_positives(k),
                    confusion.false_negatives(k),
                ),
                Err(_) if n_labels == 2 => {
                    return Err(Error::InvalidParameter {
                        name: "pos_label",
                        value: pos_label.to_string(),
                        reason: format!("not one of the labels {:?}", confusion.labels),
                    })
                }
                // Single label that is not the positive one: nothing positive to score
                Err(_) => (0.0, 0.0, 0.0),
            }
        }
        Average::Micro => {
            let (mut tp, mut fp, mut fn_) = (0, 0, 0);
            for k in 0..n_labels {
                tp += confusion.true_positives(k);
                fp += confusion.false_positives(k);
                fn_ += confusion.false_negatives(k);
            }
            prf(tp, fp, fn_)
        }
        Average::Macro | Average::Weighted => {
            let mut sums = (0.0, 0.0, 0.0);
            let mut total_weight = 0.0;
            for k in 0..n_labels {
                let (p, r, f) = prf(
                    confusion.true_positives(k),
                    confusion.false_positives(k),
                    confusion.false_negatives(k),
                );
                let w = match average {
                    Average::Weighted => confusion.support(k) as f64,
                    _ => 1.0,
                };
                sums.0 += w * p;
                sums.1 += w * r;
                sums.2 += w * f;
                total_weight += w;
            }
            if total_weight > 0.0 {
                (sums.0 / total_weight, sums.1 / total_weight, sums.2 / total_weight)
            } else {
                (0.0, 0.0, 0.0)
            }
        }
    };

    Ok(EvaluationMetrics {
        accuracy,
        precision,
        recall,
        f1,
        average,
        confusion,
    })
}
