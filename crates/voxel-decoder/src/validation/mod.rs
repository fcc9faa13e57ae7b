//! Cross-validated scoring of classifiers.
//!
//! A [`Splitter`] produces train/test [`Fold`]s; [`cross_val_score`] clones the
//! estimator for every fold, fits the clone on the training rows and records
//! its accuracy on the held-out rows.

mod metrics;
mod scheme;
mod split;

pub use metrics::{accuracy, chance_level};
pub use scheme::CvScheme;
pub use split::{Fold, KFold, LeaveOneGroupOut, Splitter, StratifiedKFold};

use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::estimator::{Classifier, EstimatorError};

/// Errors raised while cross-validating.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least 2 folds are required, got {0}")]
    TooFewFolds(usize),

    #[error("cannot make {n_folds} folds from {n_samples} samples")]
    TooManyFolds { n_folds: usize, n_samples: usize },

    #[error("{n_folds} folds requested but the largest class has only {largest} members")]
    TooFewClassMembers { n_folds: usize, largest: usize },

    #[error("this splitter requires group ids")]
    MissingGroups,

    #[error("expected {expected} group ids, got {got}")]
    GroupLengthMismatch { expected: usize, got: usize },

    #[error("at least 2 distinct groups are required, got {0}")]
    TooFewGroups(usize),

    #[error("{labels} labels for {rows} feature rows")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("fold {fold}: {source}")]
    Estimator {
        fold: usize,
        #[source]
        source: EstimatorError,
    },
}

/// Per-fold accuracies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScores {
    scores: Vec<f64>,
}

impl CvScores {
    pub fn new(scores: Vec<f64>) -> Self {
        Self { scores }
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Arithmetic mean; NaN when empty.
    pub fn mean(&self) -> f64 {
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    /// Population standard deviation; NaN when empty.
    pub fn std(&self) -> f64 {
        let mean = self.mean();
        let var = self
            .scores
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f64>()
            / self.scores.len() as f64;
        var.sqrt()
    }
}

/// Score `estimator` on every fold produced by `splitter`.
///
/// `estimator` is cloned for each fold, so its own state is left untouched.
pub fn cross_val_score<E>(
    estimator: &E,
    x: ArrayView2<'_, f32>,
    y: &[String],
    groups: Option<&[u32]>,
    splitter: &dyn Splitter,
) -> Result<CvScores, ValidationError>
where
    E: Classifier + Clone,
{
    if x.nrows() != y.len() {
        return Err(ValidationError::LengthMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }

    let folds = splitter.split(y, groups)?;
    info!(splitter = %splitter.describe(), n_folds = folds.len(), "cross-validating");

    let mut scores = Vec::with_capacity(folds.len());
    for (i, fold) in folds.iter().enumerate() {
        let wrap = |source| ValidationError::Estimator { fold: i, source };

        let x_train = x.select(Axis(0), &fold.train);
        let y_train: Vec<String> = fold.train.iter().map(|&r| y[r].clone()).collect();
        let x_test = x.select(Axis(0), &fold.test);
        let y_test: Vec<String> = fold.test.iter().map(|&r| y[r].clone()).collect();

        let mut model = estimator.clone();
        model.fit(x_train.view(), &y_train).map_err(wrap)?;
        let score = model.score(x_test.view(), &y_test).map_err(wrap)?;

        info!(
            fold = i,
            n_train = fold.train.len(),
            n_test = fold.test.len(),
            accuracy = score,
            "fold scored"
        );
        scores.push(score);
    }

    Ok(CvScores::new(scores))
}
