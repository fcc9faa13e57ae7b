//! Univariate feature selection by one-way ANOVA F-score.

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_n_features, check_xy, EstimatorError, Transformer};
use crate::labels::distinct_sorted;

/// One-way ANOVA F-score of every column of `x` against the labels `y`.
///
/// `F = (SSB / (k - 1)) / (SSW / (n - k))` for `k` classes and `n` samples.
/// A column with no within-class variance scores `+inf` when its class means
/// differ and NaN otherwise. With fewer than two classes every score is NaN.
pub fn f_classif(x: ArrayView2<'_, f32>, y: &[String]) -> Result<Array1<f64>, EstimatorError> {
    check_xy(x, y)?;

    let classes = distinct_sorted(y);
    let n_classes = classes.len();
    let n_samples = x.nrows();
    if n_classes < 2 {
        return Ok(Array1::from_elem(x.ncols(), f64::NAN));
    }

    let class_of: Vec<usize> = y
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or_default())
        .collect();
    let mut counts = vec![0usize; n_classes];
    for &c in &class_of {
        counts[c] += 1;
    }

    let df_between = (n_classes - 1) as f64;
    let df_within = n_samples.saturating_sub(n_classes) as f64;

    let mut sums = vec![0.0f64; n_classes];
    let scores = x
        .axis_iter(Axis(1))
        .map(|column| {
            sums.iter_mut().for_each(|s| *s = 0.0);
            for (&v, &c) in column.iter().zip(&class_of) {
                sums[c] += v as f64;
            }
            let grand_mean = sums.iter().sum::<f64>() / n_samples as f64;

            let ss_between: f64 = sums
                .iter()
                .zip(&counts)
                .map(|(&s, &n)| {
                    let d = s / n as f64 - grand_mean;
                    n as f64 * d * d
                })
                .sum();
            let ss_within: f64 = column
                .iter()
                .zip(&class_of)
                .map(|(&v, &c)| {
                    let d = v as f64 - sums[c] / counts[c] as f64;
                    d * d
                })
                .sum();

            if ss_within <= 0.0 || df_within == 0.0 {
                if ss_between > 0.0 {
                    f64::INFINITY
                } else {
                    f64::NAN
                }
            } else {
                (ss_between / df_between) / (ss_within / df_within)
            }
        })
        .collect::<Array1<f64>>();

    Ok(scores)
}

/// Ascending order with NaN below every number.
fn rank_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Indices of the `k` highest scores, in ascending index order.
///
/// Ties resolve towards later indices: the scores are stably sorted ascending
/// and the last `k` positions are kept.
pub fn top_k_indices(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| rank_order(scores[a], scores[b]));
    let mut selected = order.split_off(order.len().saturating_sub(k));
    selected.sort_unstable();
    selected
}

// =============================================================================
// SelectKBest
// =============================================================================

/// Number of features to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionSize {
    K(usize),
    All,
}

impl Default for SelectionSize {
    fn default() -> Self {
        Self::K(500)
    }
}

#[derive(Debug, Clone)]
struct FittedSelection {
    scores: Array1<f64>,
    support: Vec<usize>,
    n_features_in: usize,
}

/// Keeps the `k` features with the highest ANOVA F-score.
#[derive(Debug, Clone, Default)]
pub struct SelectKBest {
    size: SelectionSize,
    fitted: Option<FittedSelection>,
}

impl SelectKBest {
    pub fn new(size: SelectionSize) -> Self {
        Self { size, fitted: None }
    }

    pub fn size(&self) -> SelectionSize {
        self.size
    }

    fn fitted(&self) -> Result<&FittedSelection, EstimatorError> {
        self.fitted.as_ref().ok_or(EstimatorError::NotFitted("SelectKBest"))
    }

    /// F-scores of every input feature.
    pub fn scores(&self) -> Result<&Array1<f64>, EstimatorError> {
        Ok(&self.fitted()?.scores)
    }

    /// Indices of the retained features, ascending.
    pub fn support(&self) -> Result<&[usize], EstimatorError> {
        Ok(&self.fitted()?.support)
    }

    pub fn n_features_in(&self) -> Result<usize, EstimatorError> {
        Ok(self.fitted()?.n_features_in)
    }
}

impl Transformer for SelectKBest {
    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &[String]) -> Result<(), EstimatorError> {
        self.fitted = None;
        check_xy(x, y)?;
        let n_features = x.ncols();
        let k = match self.size {
            SelectionSize::All => n_features,
            SelectionSize::K(0) => {
                return Err(EstimatorError::InvalidParameter("k must be at least 1".into()));
            }
            SelectionSize::K(k) if k > n_features => {
                return Err(EstimatorError::InvalidParameter(format!(
                    "k = {k} exceeds the {n_features} available features"
                )));
            }
            SelectionSize::K(k) => k,
        };

        let scores = f_classif(x, y)?;
        let support = match scores.as_slice() {
            Some(s) => top_k_indices(s, k),
            None => top_k_indices(&scores.to_vec(), k),
        };
        debug!(n_features, k, "selected features by F-score");

        self.fitted = Some(FittedSelection {
            scores,
            support,
            n_features_in: n_features,
        });
        Ok(())
    }

    fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, EstimatorError> {
        let fitted = self.fitted()?;
        check_n_features(fitted.n_features_in, x.ncols())?;
        Ok(x.select(Axis(1), &fitted.support))
    }

    fn inverse_transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, EstimatorError> {
        let fitted = self.fitted()?;
        check_n_features(fitted.support.len(), x.ncols())?;
        let mut full = Array2::<f32>::zeros((x.nrows(), fitted.n_features_in));
        for (column, &feature) in x.axis_iter(Axis(1)).zip(&fitted.support) {
            full.column_mut(feature).assign(&column);
        }
        Ok(full)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use proptest::prelude::*;
    use rstest::rstest;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn f_scores_match_hand_computation() {
        let x = array![
            [1.0f32, 1.0, 0.0],
            [2.0, 1.0, 0.0],
            [3.0, 1.0, 1.0],
            [4.0, 1.0, 1.0]
        ];
        let y = labels(&["a", "a", "b", "b"]);
        let scores = f_classif(x.view(), &y).unwrap();

        // SSB = 4, SSW = 1, df = (1, 2)
        assert_relative_eq!(scores[0], 8.0, epsilon = 1e-12);
        assert!(scores[1].is_nan());
        assert_eq!(scores[2], f64::INFINITY);
    }

    #[test]
    fn single_class_scores_are_nan() {
        let x = array![[1.0f32], [2.0]];
        let scores = f_classif(x.view(), &labels(&["a", "a"])).unwrap();
        assert!(scores[0].is_nan());
    }

    #[rstest]
    #[case(&[8.0, f64::NAN, f64::INFINITY], 2, vec![0, 2])]
    #[case(&[5.0, 5.0, 5.0], 1, vec![2])]
    #[case(&[5.0, 5.0, 1.0, 5.0], 2, vec![1, 3])]
    #[case(&[f64::NAN, f64::NAN], 1, vec![1])]
    #[case(&[3.0, 1.0, 2.0], 3, vec![0, 1, 2])]
    fn top_k_ranking(#[case] scores: &[f64], #[case] k: usize, #[case] expected: Vec<usize>) {
        assert_eq!(top_k_indices(scores, k), expected);
    }

    #[test]
    fn select_transform_and_inverse() {
        let x = array![
            [1.0f32, 0.0, 10.0, 3.0],
            [2.0, 0.0, 11.0, 3.0],
            [3.0, 1.0, 30.0, 3.0],
            [4.0, 1.0, 31.0, 3.0]
        ];
        let y = labels(&["face", "face", "house", "house"]);
        let mut selector = SelectKBest::new(SelectionSize::K(2));
        selector.fit(x.view(), &y).unwrap();

        assert_eq!(selector.support().unwrap(), &[1, 2]);
        let reduced = selector.transform(x.view()).unwrap();
        assert_eq!(reduced.column(1), x.column(2));

        let restored = selector.inverse_transform(reduced.view()).unwrap();
        assert_eq!(restored.dim(), (4, 4));
        assert_eq!(restored.column(0), array![0.0f32, 0.0, 0.0, 0.0]);
        assert_eq!(restored.column(2), x.column(2));
    }

    #[test]
    fn invalid_use_is_reported() {
        let x = array![[1.0f32, 2.0], [3.0, 4.0]];
        let y = labels(&["a", "b"]);

        let unfitted = SelectKBest::new(SelectionSize::All);
        assert_eq!(
            unfitted.transform(x.view()).unwrap_err(),
            EstimatorError::NotFitted("SelectKBest")
        );

        let mut too_many = SelectKBest::new(SelectionSize::K(3));
        assert!(matches!(
            too_many.fit(x.view(), &y),
            Err(EstimatorError::InvalidParameter(_))
        ));

        let mut selector = SelectKBest::new(SelectionSize::All);
        assert!(matches!(
            selector.fit(x.view(), &labels(&["a"])),
            Err(EstimatorError::ShapeMismatch { .. })
        ));
        selector.fit(x.view(), &y).unwrap();
        assert!(matches!(
            selector.transform(array![[1.0f32]].view()),
            Err(EstimatorError::ShapeMismatch { .. })
        ));

        // A rejected refit drops the earlier selection.
        assert!(selector.is_fitted());
        selector.size = SelectionSize::K(3);
        assert!(selector.fit(x.view(), &y).is_err());
        assert!(!selector.is_fitted());
        assert_eq!(
            selector.inverse_transform(x.view()).unwrap_err(),
            EstimatorError::NotFitted("SelectKBest")
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        let x = Array2::<f32>::zeros((0, 3));
        let mut selector = SelectKBest::new(SelectionSize::K(1));
        assert!(matches!(
            selector.fit(x.view(), &[]),
            Err(EstimatorError::EmptyInput(_))
        ));
    }

    proptest! {
        #[test]
        fn support_is_sorted_and_sized(
            values in proptest::collection::vec(-10.0f32..10.0, 6 * 8),
            k in 1usize..=8,
        ) {
            let x = Array2::from_shape_vec((6, 8), values).unwrap();
            let y = labels(&["a", "b", "a", "b", "a", "b"]);
            let mut selector = SelectKBest::new(SelectionSize::K(k));
            selector.fit(x.view(), &y).unwrap();

            let support = selector.support().unwrap();
            prop_assert_eq!(support.len(), k);
            prop_assert!(support.windows(2).all(|w| w[0] < w[1]));

            let restored = selector
                .inverse_transform(selector.transform(x.view()).unwrap().view())
                .unwrap();
            for j in 0..8 {
                if support.contains(&j) {
                    prop_assert_eq!(restored.column(j), x.column(j));
                } else {
                    prop_assert!(restored.column(j).iter().all(|&v| v == 0.0));
                }
            }
        }
    }
}
