//! Classifier dispatch and fitted pipelines
//!
//! A pipeline is an optional [`StandardScaler`] followed by one classifier.
//! [`FittedPipeline`] additionally carries the [`FeatureSchema`] it was
//! trained on, so any later caller can check its feature columns against it.

use super::forest::{ForestParams, RandomForest};
use super::knn::{KnnModel, KnnParams};
use super::params::{ClassifierFamily, HyperparameterGrid, ParamSet};
use super::preprocessing::StandardScaler;
use super::svm::{SvmModel, SvmParams};
use crate::features::FeatureSchema;
use crate::maybe_rayon::*;
use landcover_core::{Error, Result};
use ndarray::{ArrayView1, ArrayView2};

/// Anything that assigns a class label to a feature row
pub trait Classifier: Sync {
    /// Known class labels, ascending
    fn classes(&self) -> &[i64];

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64;

    /// Labels for every row of `x`, in row order
    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<i64> {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(x.row(i)))
            .collect()
    }
}

/// Parsed hyperparameters of one family
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierParams {
    Svm(SvmParams),
    Knn(KnnParams),
    RandomForest(ForestParams),
}

impl ClassifierParams {
    pub fn from_params(family: ClassifierFamily, params: &ParamSet) -> Result<Self> {
        Ok(match family {
            ClassifierFamily::Svm => ClassifierParams::Svm(SvmParams::from_params(params)?),
            ClassifierFamily::Knn => ClassifierParams::Knn(KnnParams::from_params(params)?),
            ClassifierFamily::RandomForest => {
                ClassifierParams::RandomForest(ForestParams::from_params(params)?)
            }
        })
    }

    pub fn family(&self) -> ClassifierFamily {
        match self {
            ClassifierParams::Svm(_) => ClassifierFamily::Svm,
            ClassifierParams::Knn(_) => ClassifierFamily::Knn,
            ClassifierParams::RandomForest(_) => ClassifierFamily::RandomForest,
        }
    }

    /// Train; `seed` drives the random forest and is ignored otherwise
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &[i64], seed: u64) -> Result<FittedClassifier> {
        Ok(match self {
            ClassifierParams::Svm(p) => FittedClassifier::Svm(p.fit(x, y)?),
            ClassifierParams::Knn(p) => FittedClassifier::Knn(p.fit(x, y)?),
            ClassifierParams::RandomForest(p) => FittedClassifier::RandomForest(p.fit(x, y, seed)?),
        })
    }
}

/// A trained classifier of any family
#[derive(Debug, Clone, PartialEq)]
pub enum FittedClassifier {
    Svm(SvmModel),
    Knn(KnnModel),
    RandomForest(RandomForest),
}

impl Classifier for FittedClassifier {
    fn classes(&self) -> &[i64] {
        match self {
            FittedClassifier::Svm(m) => m.classes(),
            FittedClassifier::Knn(m) => m.classes(),
            FittedClassifier::RandomForest(m) => m.classes(),
        }
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        match self {
            FittedClassifier::Svm(m) => m.predict_row(row),
            FittedClassifier::Knn(m) => m.predict_row(row),
            FittedClassifier::RandomForest(m) => m.predict_row(row),
        }
    }
}

/// Scaler plus classifier, without any schema
#[derive(Debug, Clone, PartialEq)]
pub struct Predictor {
    scaler: Option<StandardScaler>,
    classifier: FittedClassifier,
}

impl Predictor {
    /// Fit the scaler (when `standardize`) and then the classifier on the
    /// scaled rows
    pub fn fit(
        family: ClassifierFamily,
        standardize: bool,
        params: &ParamSet,
        x: ArrayView2<'_, f64>,
        y: &[i64],
        seed: u64,
    ) -> Result<Self> {
        let parsed = ClassifierParams::from_params(family, params)?;
        if standardize {
            let scaler = StandardScaler::fit(x)?;
            let scaled = scaler.transform(x);
            let classifier = parsed.fit(scaled.view(), y, seed)?;
            Ok(Self {
                scaler: Some(scaler),
                classifier,
            })
        } else {
            Ok(Self {
                scaler: None,
                classifier: parsed.fit(x, y, seed)?,
            })
        }
    }

    pub fn classifier(&self) -> &FittedClassifier {
        &self.classifier
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }
}

impl Classifier for Predictor {
    fn classes(&self) -> &[i64] {
        self.classifier.classes()
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        match &self.scaler {
            Some(scaler) => self.classifier.predict_row(scaler.transform_row(row).view()),
            None => self.classifier.predict_row(row),
        }
    }
}

/// A trained pipeline bound to the feature schema it was trained on
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPipeline {
    family: ClassifierFamily,
    params: ParamSet,
    schema: FeatureSchema,
    predictor: Predictor,
}

impl FittedPipeline {
    /// Fit the grid's pipeline with `params` on all of `x`
    pub fn fit(
        grid: &HyperparameterGrid,
        params: ParamSet,
        schema: FeatureSchema,
        x: ArrayView2<'_, f64>,
        y: &[i64],
        seed: u64,
    ) -> Result<Self> {
        if x.ncols() != schema.len() {
            return Err(Error::SizeMismatch {
                er: x.nrows(),
                ec: schema.len(),
                ar: x.nrows(),
                ac: x.ncols(),
            });
        }
        let predictor = Predictor::fit(grid.family, grid.standardize, &params, x, y, seed)?;
        Ok(Self {
            family: grid.family,
            params,
            schema,
            predictor,
        })
    }

    pub fn family(&self) -> ClassifierFamily {
        self.family
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Labels for a feature matrix whose columns follow `schema`.
    ///
    /// Fails with a feature order mismatch when `schema` differs from the
    /// training schema.
    pub fn predict_checked(&self, schema: &FeatureSchema, x: ArrayView2<'_, f64>) -> Result<Vec<i64>> {
        self.schema.check(schema)?;
        if x.ncols() != self.schema.len() {
            return Err(Error::SizeMismatch {
                er: x.nrows(),
                ec: self.schema.len(),
                ar: x.nrows(),
                ac: x.ncols(),
            });
        }
        Ok(self.predict(x))
    }
}

impl Classifier for FittedPipeline {
    fn classes(&self) -> &[i64] {
        self.predictor.classes()
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        self.predictor.predict_row(row)
    }
}
