//! Supervised classification of feature tables
//!
//! - **params**: Classifier families and hyperparameter grids
//! - **preprocessing**: Feature standardization
//! - **svm**: Support vector machine (SMO, one-vs-one)
//! - **knn**: k-nearest neighbors
//! - **forest**: Random forest of CART trees
//! - **model**: Fitted pipelines bound to a feature schema
//! - **search**: Successive-halving search with stratified cross-validation
//! - **metrics**: Accuracy, precision, recall, F1 and confusion matrix
//! - **selection**: Model selection and held-out evaluation per family

mod forest;
mod knn;
mod metrics;
mod model;
mod params;
mod preprocessing;
mod search;
mod selection;
mod svm;

pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use knn::{KnnModel, KnnParams, Metric, Weights};
pub use metrics::{accuracy, evaluate_predictions, Average, ConfusionMatrix, EvaluationMetrics};
pub use model::{Classifier, ClassifierParams, FittedClassifier, FittedPipeline, Predictor};
pub use params::{format_params, ClassifierFamily, HyperparameterGrid, ParamSet, ParamValue};
pub use preprocessing::StandardScaler;
pub use search::{
    halving_search, stratified_folds, CandidateScore, HalvingSchedule, SearchOutcome,
    SearchParams, SearchRound,
};
pub use selection::{
    evaluate, select_families, select_model, FamilyReport, FamilySummary, ModelSelection,
};
pub use svm::{Gamma, Kernel, SvmModel, SvmParams};
