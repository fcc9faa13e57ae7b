//! Linear support vector classifier.
//!
//! Minimizes the L2-regularized hinge loss
//!
//! ```text
//! 0.5 * ||w||^2 + C * sum_i max(0, 1 - y_i * (w . x_i + b))
//! ```
//!
//! by coordinate descent on the dual (the LIBLINEAR method). Each pass visits
//! the samples in a fresh random order drawn from a seeded RNG.
//!
//! The bias is handled as an extra feature fixed at `intercept_scaling`, so it
//! is regularized along with the weights: the penalty on an intercept `b` is
//! `0.5 * (b / intercept_scaling)^2`. A kernel SVM with a free bias does not
//! penalize it at all, so on features far from zero mean the two give
//! different weights. Masked features are z-scored per session, which keeps
//! the difference small; raise `intercept_scaling` for uncentred data.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_n_features, check_xy, Classifier, EstimatorError};
use crate::labels::distinct_sorted;

/// Solver parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSvcParams {
    /// Misclassification penalty.
    pub c: f64,
    /// Stop when the projected-gradient spread of a pass falls below this.
    pub tol: f64,
    /// Maximum number of passes over the samples.
    pub max_iter: usize,
    /// Seed for the sample visiting order.
    pub seed: u64,
    /// Value of the constant feature carrying the bias. Larger values weaken
    /// the bias penalty.
    pub intercept_scaling: f64,
}

impl Default for LinearSvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-4,
            max_iter: 1000,
            seed: 42,
            intercept_scaling: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedSvc {
    classes: Vec<String>,
    coef: Array1<f32>,
    intercept: f32,
    n_iter: usize,
}

/// Binary linear SVM. The second of the sorted classes is the positive class.
#[derive(Debug, Clone, Default)]
pub struct LinearSvc {
    params: LinearSvcParams,
    fitted: Option<FittedSvc>,
}

impl LinearSvc {
    pub fn new(params: LinearSvcParams) -> Self {
        Self { params, fitted: None }
    }

    pub fn params(&self) -> &LinearSvcParams {
        &self.params
    }

    fn fitted(&self) -> Result<&FittedSvc, EstimatorError> {
        self.fitted.as_ref().ok_or(EstimatorError::NotFitted("LinearSvc"))
    }

    /// Weight per input feature.
    pub fn coef(&self) -> Result<ArrayView1<'_, f32>, EstimatorError> {
        Ok(self.fitted()?.coef.view())
    }

    pub fn intercept(&self) -> Result<f32, EstimatorError> {
        Ok(self.fitted()?.intercept)
    }

    /// Passes over the data used by the last fit.
    pub fn n_iter(&self) -> Result<usize, EstimatorError> {
        Ok(self.fitted()?.n_iter)
    }

    /// Signed distance-like margin per row; positive favours the second class.
    pub fn decision_function(&self, x: ArrayView2<'_, f32>) -> Result<Array1<f32>, EstimatorError> {
        let fitted = self.fitted()?;
        check_n_features(fitted.coef.len(), x.ncols())?;
        Ok(x.dot(&fitted.coef) + fitted.intercept)
    }
}

impl Classifier for LinearSvc {
    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &[String]) -> Result<(), EstimatorError> {
        self.fitted = None;
        check_xy(x, y)?;
        let LinearSvcParams {
            c,
            tol,
            max_iter,
            seed,
            intercept_scaling,
        } = self.params;
        if c.is_nan() || c <= 0.0 {
            return Err(EstimatorError::InvalidParameter(format!("C must be positive, got {c}")));
        }
        if !intercept_scaling.is_finite() || intercept_scaling <= 0.0 {
            return Err(EstimatorError::InvalidParameter(format!(
                "intercept_scaling must be positive, got {intercept_scaling}"
            )));
        }
        if max_iter == 0 {
            return Err(EstimatorError::InvalidParameter("max_iter must be at least 1".into()));
        }

        let classes = distinct_sorted(y);
        if classes.len() != 2 {
            return Err(EstimatorError::UnsupportedClassCount(classes.len()));
        }

        let (n_samples, n_features) = x.dim();
        let signs: Vec<f64> = y
            .iter()
            .map(|label| if *label == classes[1] { 1.0 } else { -1.0 })
            .collect();

        // Squared norms of the bias-augmented rows; always >= scale^2 > 0.
        let scale_sq = intercept_scaling * intercept_scaling;
        let diag: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| scale_sq + row.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>())
            .collect();

        let mut weights = vec![0.0f64; n_features];
        let mut bias = 0.0f64;
        let mut alpha = vec![0.0f64; n_samples];
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut n_iter = 0;
        let mut converged = false;
        while n_iter < max_iter {
            n_iter += 1;
            order.shuffle(&mut rng);

            let mut pg_max = f64::NEG_INFINITY;
            let mut pg_min = f64::INFINITY;
            for &i in &order {
                let row = x.row(i);
                let margin = row
                    .iter()
                    .zip(&weights)
                    .map(|(&v, &w)| v as f64 * w)
                    .sum::<f64>()
                    + bias;
                let grad = signs[i] * margin - 1.0;

                let projected = if alpha[i] <= 0.0 {
                    grad.min(0.0)
                } else if alpha[i] >= c {
                    grad.max(0.0)
                } else {
                    grad
                };
                pg_max = pg_max.max(projected);
                pg_min = pg_min.min(projected);

                if projected.abs() > 1e-12 {
                    let old = alpha[i];
                    alpha[i] = (old - grad / diag[i]).clamp(0.0, c);
                    let step = (alpha[i] - old) * signs[i];
                    for (w, &v) in weights.iter_mut().zip(row.iter()) {
                        *w += step * v as f64;
                    }
                    bias += step * scale_sq;
                }
            }

            if pg_max - pg_min <= tol {
                converged = true;
                break;
            }
        }

        let n_support = alpha.iter().filter(|&&a| a > 0.0).count();
        if converged {
            debug!(n_iter, n_support, "linear SVM converged");
        } else {
            warn!(max_iter, n_support, "linear SVM did not converge; consider raising max_iter");
        }

        self.fitted = Some(FittedSvc {
            classes,
            coef: weights.iter().map(|&w| w as f32).collect(),
            intercept: bias as f32,
            n_iter,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<String>, EstimatorError> {
        let margins = self.decision_function(x)?;
        let classes = &self.fitted()?.classes;
        Ok(margins
            .iter()
            .map(|&m| if m > 0.0 { classes[1].clone() } else { classes[0].clone() })
            .collect())
    }

    fn classes(&self) -> Result<&[String], EstimatorError> {
        Ok(&self.fitted()?.classes)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}
