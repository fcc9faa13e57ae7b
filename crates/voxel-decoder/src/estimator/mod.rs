//! Fit/transform estimators: ANOVA feature selection, linear SVM and their
//! composition.
//!
//! Stages hold their learned state in an `Option<Fitted...>`; using a stage
//! before [`Transformer::fit`] or [`Classifier::fit`] is
//! [`EstimatorError::NotFitted`]. Cloning an estimator clones its parameters
//! and any fitted state; cross-validation clones unfitted estimators.

pub mod anova;
pub mod pipeline;
pub mod svm;

use ndarray::{Array2, ArrayView2};

pub use anova::{f_classif, SelectKBest, SelectionSize};
pub use pipeline::{AnovaSvm, Pipeline};
pub use svm::{LinearSvc, LinearSvcParams};

/// Errors raised by estimators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimatorError {
    #[error("{0} is not fitted yet")]
    NotFitted(&'static str),

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("expected exactly 2 classes, found {0}")]
    UnsupportedClassCount(usize),
}

/// Check that a label slice lines up with the rows of `x` and neither is empty.
pub(crate) fn check_xy(x: ArrayView2<'_, f32>, y: &[String]) -> Result<(), EstimatorError> {
    if x.nrows() == 0 {
        return Err(EstimatorError::EmptyInput("no samples"));
    }
    if x.ncols() == 0 {
        return Err(EstimatorError::EmptyInput("no features"));
    }
    if x.nrows() != y.len() {
        return Err(EstimatorError::ShapeMismatch {
            expected: format!("{} labels", x.nrows()),
            got: format!("{} labels", y.len()),
        });
    }
    Ok(())
}

pub(crate) fn check_n_features(
    expected: usize,
    got: usize,
) -> Result<(), EstimatorError> {
    if expected != got {
        return Err(EstimatorError::ShapeMismatch {
            expected: format!("{expected} features"),
            got: format!("{got} features"),
        });
    }
    Ok(())
}

// =============================================================================
// Traits
// =============================================================================

/// A stage that learns a feature-space mapping from labelled data.
pub trait Transformer {
    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &[String]) -> Result<(), EstimatorError>;

    /// Map rows into the learned feature space.
    fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, EstimatorError>;

    /// Map rows from the learned feature space back to the input space.
    fn inverse_transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, EstimatorError>;

    fn is_fitted(&self) -> bool;
}

/// A stage that predicts one label per row.
pub trait Classifier {
    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &[String]) -> Result<(), EstimatorError>;

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<String>, EstimatorError>;

    /// Class labels seen at fit time, sorted.
    fn classes(&self) -> Result<&[String], EstimatorError>;

    fn is_fitted(&self) -> bool;

    /// Accuracy of [`Classifier::predict`] against `y`.
    fn score(&self, x: ArrayView2<'_, f32>, y: &[String]) -> Result<f64, EstimatorError> {
        if x.nrows() != y.len() {
            return Err(EstimatorError::ShapeMismatch {
                expected: format!("{} labels", x.nrows()),
                got: format!("{} labels", y.len()),
            });
        }
        let predicted = self.predict(x)?;
        Ok(crate::validation::accuracy(&predicted, y))
    }
}
