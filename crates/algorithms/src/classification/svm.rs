//! Support vector classification
//!
//! Soft-margin C-SVM trained with sequential minimal optimization, using the
//! maximal-violating-pair working set and the two-variable update of LIBSVM.
//! More than two classes are handled one-vs-one: one binary machine per pair
//! of classes, prediction by majority vote with ties going to the smaller
//! label.

use super::params::{ParamReader, ParamSet, ParamValue};
use landcover_core::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeSet;
use tracing::debug;

const TAU: f64 = 1e-12;

/// Kernel function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Linear,
    Rbf,
    Poly,
    Sigmoid,
    /// Expects a Gram matrix instead of feature vectors; not usable on
    /// feature tables and always fails to fit
    Precomputed,
}

/// Kernel coefficient for rbf, poly and sigmoid
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// `1 / (n_features * X.var())`
    Scale,
    /// `1 / n_features`
    Auto,
    Value(f64),
}

/// Parameters for SVM training
#[derive(Debug, Clone, PartialEq)]
pub struct SvmParams {
    pub kernel: Kernel,
    /// Regularization strength, > 0
    pub c: f64,
    pub gamma: Gamma,
    /// Polynomial degree (default: 3)
    pub degree: u32,
    /// Independent term of poly and sigmoid (default: 0)
    pub coef0: f64,
    /// Stopping tolerance on the KKT violation (default: 1e-3)
    pub tol: f64,
    /// Iteration cap per binary machine; `None` picks `max(10_000, 100 * n)`
    pub max_iter: Option<usize>,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf,
            c: 1.0,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: None,
        }
    }
}

impl SvmParams {
    /// Parse `kernel`, `C`, `gamma`, `degree`, `coef0`, `tol` and `max_iter`
    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let r = ParamReader::new(
            params,
            &["kernel", "C", "gamma", "degree", "coef0", "tol", "max_iter"],
        )?;
        let defaults = Self::default();

        let kernel = match r.str_or("kernel", "rbf")? {
            "linear" => Kernel::Linear,
            "rbf" => Kernel::Rbf,
            "poly" => Kernel::Poly,
            "sigmoid" => Kernel::Sigmoid,
            "precomputed" => Kernel::Precomputed,
            _ => {
                return Err(r.invalid(
                    "kernel",
                    "expected linear, rbf, poly, sigmoid or precomputed",
                ))
            }
        };

        let c = r.f64_or("C", defaults.c)?;
        if !(c > 0.0) {
            return Err(r.invalid("C", "must be positive"));
        }

        let gamma = match r.raw("gamma") {
            None => Gamma::Scale,
            Some(ParamValue::Text(s)) if s == "scale" => Gamma::Scale,
            Some(ParamValue::Text(s)) if s == "auto" => Gamma::Auto,
            Some(v) => match v.as_f64() {
                Some(g) if g > 0.0 => Gamma::Value(g),
                _ => return Err(r.invalid("gamma", "expected scale, auto or a positive number")),
            },
        };

        let degree = u32::try_from(r.usize_or("degree", defaults.degree as usize)?)
            .map_err(|_| r.invalid("degree", "too large"))?;
        let coef0 = r.f64_or("coef0", defaults.coef0)?;
        let tol = r.f64_or("tol", defaults.tol)?;
        if !(tol > 0.0) {
            return Err(r.invalid("tol", "must be positive"));
        }
        let max_iter = match r.raw("max_iter") {
            Some(_) => Some(r.usize_or("max_iter", 0)?),
            None => None,
        };

        Ok(Self {
            kernel,
            c,
            gamma,
            degree,
            coef0,
            tol,
            max_iter,
        })
    }

    /// Train on rows of `x` labeled by `y`
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<SvmModel> {
        let (n, n_features) = x.dim();
        if n != y.len() {
            return Err(Error::SizeMismatch {
                er: y.len(),
                ec: n_features,
                ar: n,
                ac: n_features,
            });
        }
        let classes: Vec<i64> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if classes.len() < 2 {
            return Err(Error::Algorithm(format!(
                "SVM needs at least two classes, found {}",
                classes.len()
            )));
        }

        let kernel = self.kernel_fn(x)?;
        let gram = gram_matrix(&kernel, x);
        let max_iter = self.max_iter.unwrap_or_else(|| (100 * n).max(10_000));

        let mut machines = Vec::new();
        for a in 0..classes.len() {
            for b in (a + 1)..classes.len() {
                let rows: Vec<usize> = (0..n)
                    .filter(|&i| y[i] == classes[a] || y[i] == classes[b])
                    .collect();
                let signs: Vec<f64> = rows
                    .iter()
                    .map(|&i| if y[i] == classes[a] { 1.0 } else { -1.0 })
                    .collect();
                let (coef, rho) = solve_binary(&gram, &rows, &signs, self.c, self.tol, max_iter);
                machines.push(Machine {
                    positive: a,
                    negative: b,
                    coef,
                    rho,
                });
            }
        }

        // Keep only the rows that ended up as support vectors
        let support: Vec<usize> = machines
            .iter()
            .flat_map(|m| m.coef.iter().map(|&(i, _)| i))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut position = vec![usize::MAX; n];
        for (p, &i) in support.iter().enumerate() {
            position[i] = p;
        }
        for machine in &mut machines {
            for entry in &mut machine.coef {
                entry.0 = position[entry.0];
            }
        }

        Ok(SvmModel {
            support_vectors: x.select(Axis(0), &support),
            kernel,
            classes,
            machines,
        })
    }

    fn kernel_fn(&self, x: ArrayView2<'_, f64>) -> Result<KernelFn> {
        let n_features = x.ncols().max(1) as f64;
        let gamma = match self.gamma {
            Gamma::Value(g) => g,
            Gamma::Auto => 1.0 / n_features,
            Gamma::Scale => {
                let count = x.len().max(1) as f64;
                let mean = x.sum() / count;
                let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
                if var > 0.0 {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
        };
        let kind = match self.kernel {
            Kernel::Linear => KernelKind::Linear,
            Kernel::Rbf => KernelKind::Rbf,
            Kernel::Poly => KernelKind::Poly,
            Kernel::Sigmoid => KernelKind::Sigmoid,
            Kernel::Precomputed => {
                return Err(Error::InvalidParameter {
                    name: "kernel",
                    value: "precomputed".into(),
                    reason: "needs a square Gram matrix, not a feature table".into(),
                })
            }
        };
        Ok(KernelFn {
            kind,
            gamma,
            degree: self.degree as i32,
            coef0: self.coef0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KernelKind {
    Linear,
    Rbf,
    Poly,
    Sigmoid,
}

/// A kernel with its coefficients resolved against the training data
#[derive(Debug, Clone, Copy, PartialEq)]
struct KernelFn {
    kind: KernelKind,
    gamma: f64,
    degree: i32,
    coef0: f64,
}

impl KernelFn {
    fn eval(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self.kind {
            KernelKind::Linear => a.dot(&b),
            KernelKind::Rbf => {
                let d2: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
                (-self.gamma * d2).exp()
            }
            KernelKind::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree),
            KernelKind::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }
}

fn gram_matrix(kernel: &KernelFn, x: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut gram = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let k = kernel.eval(x.row(i), x.row(j));
            gram[[i, j]] = k;
            gram[[j, i]] = k;
        }
    }
    gram
}

/// Solve one binary dual problem over `rows` of the Gram matrix.
///
/// Returns the nonzero `alpha_i * y_i` keyed by Gram row, and the bias `rho`
/// so that `f(x) = sum(coef_i * K(x_i, x)) - rho`.
fn solve_binary(
    gram: &Array2<f64>,
    rows: &[usize],
    y: &[f64],
    c: f64,
    tol: f64,
    max_iter: usize,
) -> (Vec<(usize, f64)>, f64) {
    let m = rows.len();
    let q = |i: usize, j: usize| y[i] * y[j] * gram[[rows[i], rows[j]]];
    let mut alpha = vec![0.0; m];
    let mut grad = vec![-1.0; m];

    let mut converged = false;
    for _ in 0..max_iter {
        let mut g_max = f64::NEG_INFINITY;
        let mut g_min = f64::INFINITY;
        let (mut i, mut j) = (usize::MAX, usize::MAX);
        for t in 0..m {
            let yg = -y[t] * grad[t];
            let up = (y[t] > 0.0 && alpha[t] < c) || (y[t] < 0.0 && alpha[t] > 0.0);
            let low = (y[t] > 0.0 && alpha[t] > 0.0) || (y[t] < 0.0 && alpha[t] < c);
            if up && yg > g_max {
                g_max = yg;
                i = t;
            }
            if low && yg < g_min {
                g_min = yg;
                j = t;
            }
        }
        if i == usize::MAX || j == usize::MAX || g_max - g_min < tol {
            converged = true;
            break;
        }

        let (old_i, old_j) = (alpha[i], alpha[j]);
        let q_ij = q(i, j);
        if y[i] != y[j] {
            let quad = (q(i, i) + q(j, j) + 2.0 * q_ij).max(TAU);
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let quad = (q(i, i) + q(j, j) - 2.0 * q_ij).max(TAU);
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (d_i, d_j) = (alpha[i] - old_i, alpha[j] - old_j);
        for (t, g) in grad.iter_mut().enumerate() {
            *g += q(t, i) * d_i + q(t, j) * d_j;
        }
    }
    if !converged {
        debug!(max_iter, samples = m, "SMO stopped at the iteration cap");
    }

    let rho = bias(&alpha, &grad, y, c);
    let coef = alpha
        .iter()
        .enumerate()
        .filter(|(_, a)| **a > 0.0)
        .map(|(t, &a)| (rows[t], a * y[t]))
        .collect();
    (coef, rho)
}

/// Average `y * grad` over free variables, or the midpoint of the feasible
/// interval when every variable sits at a bound
fn bias(alpha: &[f64], grad: &[f64], y: &[f64], c: f64) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free = 0usize;

    for t in 0..alpha.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= c {
            if y[t] < 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else {
            free += 1;
            free_sum += yg;
        }
    }

    if free > 0 {
        free_sum / free as f64
    } else {
        (upper + lower) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Machine {
    /// Class index voted for when the decision value is positive
    positive: usize,
    negative: usize,
    /// `(support vector index, alpha * y)`
    coef: Vec<(usize, f64)>,
    rho: f64,
}

/// A trained one-vs-one SVM
#[derive(Debug, Clone, PartialEq)]
pub struct SvmModel {
    support_vectors: Array2<f64>,
    kernel: KernelFn,
    classes: Vec<i64>,
    machines: Vec<Machine>,
}

impl SvmModel {
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.nrows()
    }

    /// Decision value of every pairwise machine, in (a, b) pair order
    pub fn decision_values(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let k: Vec<f64> = self
            .support_vectors
            .outer_iter()
            .map(|sv| self.kernel.eval(sv, row))
            .collect();
        self.machines
            .iter()
            .map(|m| m.coef.iter().map(|&(s, a)| a * k[s]).sum::<f64>() - m.rho)
            .collect()
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        let mut votes = vec![0usize; self.classes.len()];
        for (m, d) in self.machines.iter().zip(self.decision_values(row)) {
            if d > 0.0 {
                votes[m.positive] += 1;
            } else {
                votes[m.negative] += 1;
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
