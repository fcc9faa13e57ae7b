//! Per-sample condition labels and session identifiers.
//!
//! The label table is a delimited text file with a header row, one row per
//! functional frame:
//!
//! ```text
//! labels chunks
//! rest 0
//! face 0
//! house 0
//! ```
//!
//! [`ConditionMask`] restricts samples to two target conditions. Every
//! sequence aligned with the samples (labels, sessions, feature rows) must be
//! filtered through the same mask.

use std::fs;
use std::path::Path;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default label column name.
pub const LABEL_COLUMN: &str = "labels";

/// Default session column name.
pub const SESSION_COLUMN: &str = "chunks";

/// Errors from loading or filtering label tables.
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed label table: {0}")]
    Csv(#[from] csv::Error),

    #[error("label table is empty")]
    Empty,

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("row {row}: invalid session id {value:?}")]
    InvalidSession { row: usize, value: String },

    #[error("condition mask covers {mask} samples but sequence has {got}")]
    LengthMismatch { mask: usize, got: usize },

    #[error("target classes must be distinct, got {0:?} twice")]
    DuplicateTarget(String),
}

// =============================================================================
// TargetClasses
// =============================================================================

/// The two conditions retained for decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetClasses {
    classes: [String; 2],
}

impl TargetClasses {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Result<Self, LabelError> {
        let (first, second) = (first.into(), second.into());
        if first == second {
            return Err(LabelError::DuplicateTarget(first));
        }
        Ok(Self {
            classes: [first, second],
        })
    }

    #[inline]
    pub fn contains(&self, label: &str) -> bool {
        self.classes.iter().any(|c| c == label)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.classes
    }
}

impl Default for TargetClasses {
    fn default() -> Self {
        Self {
            classes: ["face".to_string(), "house".to_string()],
        }
    }
}

// =============================================================================
// LabelTable
// =============================================================================

/// Condition label and session id for each sample, in acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelTable {
    labels: Vec<String>,
    sessions: Vec<u32>,
}

impl LabelTable {
    /// Build a table from parallel sequences.
    pub fn new(labels: Vec<String>, sessions: Vec<u32>) -> Result<Self, LabelError> {
        if labels.len() != sessions.len() {
            return Err(LabelError::LengthMismatch {
                mask: labels.len(),
                got: sessions.len(),
            });
        }
        Ok(Self { labels, sessions })
    }

    /// Load a table from disk using the default column names.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        Self::load_columns(path, LABEL_COLUMN, SESSION_COLUMN)
    }

    /// Load a table from disk, naming the label and session columns.
    pub fn load_columns(
        path: &Path,
        label_column: &str,
        session_column: &str,
    ) -> Result<Self, LabelError> {
        let content = fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::parse(&content, label_column, session_column)?;
        debug!(path = %path.display(), n_samples = table.len(), "loaded label table");
        Ok(table)
    }

    /// Parse table text. The delimiter is detected from the header line:
    /// comma, then tab, otherwise runs of whitespace.
    pub fn parse(content: &str, label_column: &str, session_column: &str) -> Result<Self, LabelError> {
        let header = content
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or(LabelError::Empty)?;

        let normalized;
        let (text, delimiter) = if header.contains(',') {
            (content, b',')
        } else if header.contains('\t') {
            (content, b'\t')
        } else {
            normalized = content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\n");
            (normalized.as_str(), b' ')
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| LabelError::MissingColumn(name.to_string()))
        };
        let label_idx = find(label_column)?;
        let session_idx = find(session_column)?;

        let mut labels = Vec::new();
        let mut sessions = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let label = record.get(label_idx).unwrap_or_default();
            let session = record.get(session_idx).unwrap_or_default();
            let session: u32 = session.parse().map_err(|_| LabelError::InvalidSession {
                row,
                value: session.to_string(),
            })?;
            labels.push(label.to_string());
            sessions.push(session);
        }

        Ok(Self { labels, sessions })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn sessions(&self) -> &[u32] {
        &self.sessions
    }

    /// Keep only the rows selected by `mask`.
    pub fn filter(&self, mask: &ConditionMask) -> Result<Self, LabelError> {
        Ok(Self {
            labels: mask.apply(&self.labels)?,
            sessions: mask.apply(&self.sessions)?,
        })
    }

    /// Distinct labels in sorted order.
    pub fn classes(&self) -> Vec<String> {
        distinct_sorted(&self.labels)
    }
}

/// Distinct values of `labels`, sorted.
pub fn distinct_sorted(labels: &[String]) -> Vec<String> {
    let mut classes = labels.to_vec();
    classes.sort();
    classes.dedup();
    classes
}

// =============================================================================
// ConditionMask
// =============================================================================

/// Boolean selection over samples, true where the label is a target class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionMask {
    keep: Vec<bool>,
}

impl ConditionMask {
    pub fn from_labels(labels: &[String], targets: &TargetClasses) -> Self {
        Self {
            keep: labels.iter().map(|l| targets.contains(l)).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keep.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keep.is_empty()
    }

    /// Number of retained samples.
    pub fn n_selected(&self) -> usize {
        self.keep.iter().filter(|&&k| k).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.keep
    }

    /// Indices of retained samples.
    pub fn indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect()
    }

    fn check_len(&self, got: usize) -> Result<(), LabelError> {
        if got != self.keep.len() {
            return Err(LabelError::LengthMismatch {
                mask: self.keep.len(),
                got,
            });
        }
        Ok(())
    }

    /// Filter a sequence aligned with the samples.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Result<Vec<T>, LabelError> {
        self.check_len(items.len())?;
        Ok(items
            .iter()
            .zip(&self.keep)
            .filter_map(|(item, &k)| k.then(|| item.clone()))
            .collect())
    }

    /// Filter the rows of a `[n_samples, n_features]` matrix.
    pub fn select_rows(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, LabelError> {
        self.check_len(features.nrows())?;
        Ok(features.select(Axis(0), &self.indices()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    const HAXBY_LIKE: &str = "labels chunks\nrest 0\nface 0\nhouse 0\ncat 1\nface 1\nhouse 1\n";

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_space_delimited() {
        let table = LabelTable::parse(HAXBY_LIKE, LABEL_COLUMN, SESSION_COLUMN).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.labels()[1], "face");
        assert_eq!(table.sessions(), &[0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn parse_comma_delimited_case_insensitive_header() {
        let text = "Chunks,Labels\n0,face\n3,house\n";
        let table = LabelTable::parse(text, LABEL_COLUMN, SESSION_COLUMN).unwrap();
        assert_eq!(table.labels(), &strings(&["face", "house"])[..]);
        assert_eq!(table.sessions(), &[0, 3]);
    }

    #[test]
    fn parse_collapses_repeated_whitespace() {
        let text = "labels   chunks\n face    2\n\nhouse\t 4\n";
        let table = LabelTable::parse(text, LABEL_COLUMN, SESSION_COLUMN).unwrap();
        assert_eq!(table.sessions(), &[2, 4]);
    }

    #[test]
    fn parse_missing_column() {
        let err = LabelTable::parse("labels runs\nface 0\n", LABEL_COLUMN, SESSION_COLUMN).unwrap_err();
        assert!(matches!(err, LabelError::MissingColumn(c) if c == "chunks"));
    }

    #[test]
    fn parse_invalid_session() {
        let err = LabelTable::parse("labels chunks\nface x\n", LABEL_COLUMN, SESSION_COLUMN).unwrap_err();
        assert!(matches!(err, LabelError::InvalidSession { row: 0, .. }));
    }

    #[rstest]
    #[case::short_row("labels,chunks\nface,0\nhouse\n")]
    #[case::long_row("labels,chunks\nface,0\nhouse,1,extra\n")]
    #[case::whitespace("labels chunks\nface 0 1\n")]
    fn parse_ragged_rows(#[case] text: &str) {
        let err = LabelTable::parse(text, LABEL_COLUMN, SESSION_COLUMN).unwrap_err();
        assert!(matches!(err, LabelError::Csv(_)), "unexpected error {err:?}");
    }

    #[test]
    fn parse_empty() {
        assert!(matches!(
            LabelTable::parse("\n\n", LABEL_COLUMN, SESSION_COLUMN),
            Err(LabelError::Empty)
        ));
    }

    #[test]
    fn mask_keeps_exactly_the_targets() {
        let table = LabelTable::parse(HAXBY_LIKE, LABEL_COLUMN, SESSION_COLUMN).unwrap();
        let mask = ConditionMask::from_labels(table.labels(), &TargetClasses::default());
        assert_eq!(mask.as_slice(), &[false, true, true, false, true, true]);

        let filtered = table.filter(&mask).unwrap();
        assert_eq!(filtered.len(), 4);
        assert!(filtered.labels().iter().all(|l| l == "face" || l == "house"));
        assert_eq!(filtered.sessions(), &[0, 0, 1, 1]);
    }

    #[test]
    fn filtering_keeps_rows_aligned() {
        let table = LabelTable::parse(HAXBY_LIKE, LABEL_COLUMN, SESSION_COLUMN).unwrap();
        let features = Array2::from_shape_fn((6, 2), |(r, c)| (r * 10 + c) as f32);
        let mask = ConditionMask::from_labels(table.labels(), &TargetClasses::default());

        let filtered = table.filter(&mask).unwrap();
        let rows = mask.select_rows(features.view()).unwrap();

        assert_eq!(filtered.labels().len(), filtered.sessions().len());
        assert_eq!(filtered.len(), rows.nrows());
        assert_eq!(rows.row(0), array![10.0, 11.0]);
        assert_eq!(rows.row(3), array![50.0, 51.0]);
    }

    #[test]
    fn absent_targets_select_nothing() {
        let labels = strings(&["rest", "cat", "shoe"]);
        let mask = ConditionMask::from_labels(&labels, &TargetClasses::default());
        assert_eq!(mask.n_selected(), 0);

        let features = Array2::<f32>::zeros((3, 4));
        let rows = mask.select_rows(features.view()).unwrap();
        assert_eq!(rows.dim(), (0, 4));
        assert!(mask.apply(&labels).unwrap().is_empty());
    }

    #[test]
    fn mask_length_mismatch_is_rejected() {
        let mask = ConditionMask::from_labels(&strings(&["face", "house"]), &TargetClasses::default());
        assert!(matches!(
            mask.apply(&[1u32, 2, 3]),
            Err(LabelError::LengthMismatch { mask: 2, got: 3 })
        ));
        let features = Array2::<f32>::zeros((3, 1));
        assert!(mask.select_rows(features.view()).is_err());
    }

    #[test]
    fn duplicate_targets_rejected() {
        assert!(TargetClasses::new("face", "face").is_err());
        let targets = TargetClasses::new("cat", "shoe").unwrap();
        assert!(targets.contains("shoe"));
        assert!(!targets.contains("face"));
    }

    #[test]
    fn classes_are_sorted_and_distinct() {
        let table = LabelTable::new(strings(&["house", "face", "house"]), vec![0, 0, 1]).unwrap();
        assert_eq!(table.classes(), strings(&["face", "house"]));
    }
}
