//! Selector followed by classifier, fitted and applied as one unit.

use ndarray::{Array2, ArrayView2};

use super::{Classifier, EstimatorError, LinearSvc, SelectKBest, Transformer};

/// A [`Transformer`] feeding a [`Classifier`].
///
/// `fit` fits the transformer on the full input, then fits the classifier on
/// the transformed features. `predict` applies the same two steps.
#[derive(Debug, Clone)]
pub struct Pipeline<T, C> {
    selector: T,
    classifier: C,
}

/// The ANOVA + linear SVM decoder.
pub type AnovaSvm = Pipeline<SelectKBest, LinearSvc>;

impl<T, C> Pipeline<T, C>
where
    T: Transformer,
    C: Classifier,
{
    pub fn new(selector: T, classifier: C) -> Self {
        Self { selector, classifier }
    }

    pub fn selector(&self) -> &T {
        &self.selector
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Map rows of the selected space back to the input feature space.
    pub fn inverse_transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, EstimatorError> {
        self.selector.inverse_transform(x)
    }

    /// Apply the fitted selector only.
    pub fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, EstimatorError> {
        self.selector.transform(x)
    }
}

impl<T, C> Classifier for Pipeline<T, C>
where
    T: Transformer,
    C: Classifier,
{
    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &[String]) -> Result<(), EstimatorError> {
        self.selector.fit(x, y)?;
        let selected = self.selector.transform(x)?;
        self.classifier.fit(selected.view(), y)
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<String>, EstimatorError> {
        let selected = self.selector.transform(x)?;
        self.classifier.predict(selected.view())
    }

    fn classes(&self) -> Result<&[String], EstimatorError> {
        self.classifier.classes()
    }

    fn is_fitted(&self) -> bool {
        self.selector.is_fitted() && self.classifier.is_fitted()
    }
}
