//! voxel-decoder: decoding perceptual categories from fMRI volumes.
//!
//! A face-vs-house decoder on the Haxby (2001) dataset: functional volumes
//! are masked into a sample-by-voxel matrix, the most class-selective voxels
//! are picked by ANOVA F-score, and a linear SVM is cross-validated on them.
//! The SVM weights are mapped back into brain space and saved as NIfTI.
//!
//! # Key Types
//!
//! - [`DecodingConfig`] - Run configuration builder
//! - [`VolumeMasker`] - Volume to feature-matrix conversion and back
//! - [`Pipeline`] of [`SelectKBest`] and [`LinearSvc`] - The decoder
//! - [`cross_val_score`] with a [`Splitter`] - Out-of-sample accuracy
//! - [`workflow::run`] - The full run
//!
//! # Example
//!
//! ```
//! use voxel_decoder::{Classifier, LinearSvc, Pipeline, SelectKBest, SelectionSize};
//! use voxel_decoder::testing::two_class_features;
//!
//! let (x, y) = two_class_features(40, 50, 5, 1.5, 0);
//! let mut decoder = Pipeline::new(SelectKBest::new(SelectionSize::K(5)), LinearSvc::default());
//! decoder.fit(x.view(), &y).unwrap();
//! assert!(decoder.score(x.view(), &y).unwrap() > 0.9);
//! ```

pub mod cache;
pub mod config;
pub mod estimator;
pub mod fetch;
pub mod labels;
pub mod masking;
pub mod report;
pub mod testing;
pub mod validation;
pub mod volume;
pub mod workflow;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Configuration
pub use config::{ConfigError, DecodingConfig};

// Data preparation
pub use labels::{ConditionMask, LabelTable, TargetClasses};
pub use masking::{BrainMask, MaskerParams, VolumeMasker};
pub use volume::{Volume3, Volume4};

// Models
pub use estimator::{
    Classifier, EstimatorError, LinearSvc, LinearSvcParams, Pipeline, SelectKBest,
    SelectionSize, Transformer,
};

// Validation
pub use validation::{cross_val_score, CvScheme, CvScores, Splitter};

// Running
pub use workflow::{DecodingReport, WorkflowError};
