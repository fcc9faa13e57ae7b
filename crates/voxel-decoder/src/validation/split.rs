//! Train/test fold generation.
//!
//! All splitters are unshuffled and deterministic. Index lists in a [`Fold`]
//! are ascending, and the test sets of one split partition the samples.

use tracing::warn;

use super::ValidationError;
use crate::labels::distinct_sorted;

/// One train/test partition of the sample indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Fold {
    /// Build a fold from a per-sample "is test" flag.
    fn from_test_flags(is_test: &[bool]) -> Self {
        let (test, train): (Vec<usize>, Vec<usize>) =
            (0..is_test.len()).partition(|&i| is_test[i]);
        Self { train, test }
    }
}

/// Produces the folds of a cross-validation scheme.
pub trait Splitter {
    /// `groups`, when required, holds one group id per sample.
    fn split(&self, y: &[String], groups: Option<&[u32]>) -> Result<Vec<Fold>, ValidationError>;

    /// Short human-readable description, used in logs and reports.
    fn describe(&self) -> String;
}

fn check_fold_count(n_folds: usize, n_samples: usize) -> Result<(), ValidationError> {
    if n_folds < 2 {
        return Err(ValidationError::TooFewFolds(n_folds));
    }
    if n_folds > n_samples {
        return Err(ValidationError::TooManyFolds { n_folds, n_samples });
    }
    Ok(())
}

/// Sizes of `n_folds` contiguous chunks of `n` items; the first `n % n_folds`
/// chunks hold one extra item.
fn chunk_sizes(n: usize, n_folds: usize) -> impl Iterator<Item = usize> {
    let base = n / n_folds;
    let extra = n % n_folds;
    (0..n_folds).map(move |i| base + usize::from(i < extra))
}

// =============================================================================
// KFold
// =============================================================================

/// Contiguous folds in sample order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_folds: usize,
}

impl KFold {
    pub fn new(n_folds: usize) -> Self {
        Self { n_folds }
    }
}

impl Splitter for KFold {
    fn split(&self, y: &[String], _groups: Option<&[u32]>) -> Result<Vec<Fold>, ValidationError> {
        let n = y.len();
        check_fold_count(self.n_folds, n)?;

        let mut start = 0;
        Ok(chunk_sizes(n, self.n_folds)
            .map(|size| {
                let mut is_test = vec![false; n];
                is_test[start..start + size].iter_mut().for_each(|t| *t = true);
                start += size;
                Fold::from_test_flags(&is_test)
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("KFold(n_folds={})", self.n_folds)
    }
}

// =============================================================================
// StratifiedKFold
// =============================================================================

/// Folds that preserve class proportions.
///
/// Each class's samples, in order, are cut into `n_folds` contiguous chunks;
/// fold `i` tests chunk `i` of every class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    pub n_folds: usize,
}

impl StratifiedKFold {
    pub fn new(n_folds: usize) -> Self {
        Self { n_folds }
    }
}

impl Splitter for StratifiedKFold {
    fn split(&self, y: &[String], _groups: Option<&[u32]>) -> Result<Vec<Fold>, ValidationError> {
        let n = y.len();
        check_fold_count(self.n_folds, n)?;

        let classes = distinct_sorted(y);
        let members: Vec<Vec<usize>> = classes
            .iter()
            .map(|class| (0..n).filter(|&i| &y[i] == class).collect())
            .collect();

        let largest = members.iter().map(Vec::len).max().unwrap_or(0);
        if largest < self.n_folds {
            return Err(ValidationError::TooFewClassMembers {
                n_folds: self.n_folds,
                largest,
            });
        }
        let smallest = members.iter().map(Vec::len).min().unwrap_or(0);
        if smallest < self.n_folds {
            warn!(
                smallest,
                n_folds = self.n_folds,
                "least populated class has fewer members than folds"
            );
        }

        // fold_of[i] = fold in which sample i is tested
        let mut fold_of = vec![0usize; n];
        for indices in &members {
            let mut offset = 0;
            for (fold, size) in chunk_sizes(indices.len(), self.n_folds).enumerate() {
                for &i in &indices[offset..offset + size] {
                    fold_of[i] = fold;
                }
                offset += size;
            }
        }

        Ok((0..self.n_folds)
            .map(|fold| {
                let is_test: Vec<bool> = fold_of.iter().map(|&f| f == fold).collect();
                Fold::from_test_flags(&is_test)
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("StratifiedKFold(n_folds={})", self.n_folds)
    }
}

// =============================================================================
// LeaveOneGroupOut
// =============================================================================

/// One fold per distinct group id, in ascending id order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveOneGroupOut;

impl Splitter for LeaveOneGroupOut {
    fn split(&self, y: &[String], groups: Option<&[u32]>) -> Result<Vec<Fold>, ValidationError> {
        let groups = groups.ok_or(ValidationError::MissingGroups)?;
        if groups.len() != y.len() {
            return Err(ValidationError::GroupLengthMismatch {
                expected: y.len(),
                got: groups.len(),
            });
        }

        let mut ids = groups.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() < 2 {
            return Err(ValidationError::TooFewGroups(ids.len()));
        }

        Ok(ids
            .into_iter()
            .map(|id| {
                let is_test: Vec<bool> = groups.iter().map(|&g| g == id).collect();
                Fold::from_test_flags(&is_test)
            })
            .collect())
    }

    fn describe(&self) -> String {
        "LeaveOneGroupOut".to_string()
    }
}
