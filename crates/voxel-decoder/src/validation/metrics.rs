//! Classification metrics.

use crate::labels::distinct_sorted;

/// Fraction of positions where `predicted` equals `truth`.
///
/// Empty input scores 0. Only the common prefix is compared; callers check
/// lengths beforehand.
pub fn accuracy(predicted: &[String], truth: &[String]) -> f64 {
    let n = predicted.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }
    let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    correct as f64 / n as f64
}

/// Accuracy of always guessing one class: `1 / n_classes`.
///
/// Zero when `labels` is empty.
pub fn chance_level(labels: &[String]) -> f64 {
    match distinct_sorted(labels).len() {
        0 => 0.0,
        n => 1.0 / n as f64,
    }
}
