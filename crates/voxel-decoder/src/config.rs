//! Run configuration with builder pattern.
//!
//! [`DecodingConfig`] gathers every knob of a decoding run. It is built with
//! `bon` and validated when `build()` is called.
//!
//! ```
//! use voxel_decoder::config::DecodingConfig;
//! use voxel_decoder::estimator::SelectionSize;
//!
//! let config = DecodingConfig::builder()
//!     .data_dir("/tmp/nilearn_data")
//!     .n_features(SelectionSize::K(200))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.n_folds, 3);
//! ```

use std::path::PathBuf;

use bon::Builder;

use crate::estimator::{LinearSvcParams, SelectionSize};
use crate::labels::TargetClasses;
use crate::masking::MaskerParams;
use crate::validation::CvScheme;

/// Environment variable overriding the default data directory.
pub const DATA_DIR_ENV: &str = "HAXBY_DATA";

/// `$HAXBY_DATA` if set, else `~/nilearn_data`, else `./nilearn_data`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join("nilearn_data"))
        .unwrap_or_else(|| PathBuf::from("nilearn_data"))
}

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Smoothing FWHM must be finite and non-negative.
    InvalidSmoothing(f32),
    /// At least one feature must be selected.
    InvalidFeatureCount,
    /// Fold count must be at least 2.
    InvalidFolds(usize),
    /// Solver parameter out of range.
    InvalidSolver { field: &'static str, value: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSmoothing(v) => {
                write!(f, "smoothing_fwhm must be finite and non-negative, got {}", v)
            }
            Self::InvalidFeatureCount => write!(f, "n_features must be at least 1"),
            Self::InvalidFolds(n) => write!(f, "n_folds must be at least 2, got {}", n),
            Self::InvalidSolver { field, value } => {
                write!(f, "{} must be positive, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// DecodingConfig
// =============================================================================

/// Configuration of a face-vs-house decoding run.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct DecodingConfig {
    // === Inputs ===
    /// Where the dataset is fetched to. Default: [`default_data_dir`].
    #[builder(into, default = default_data_dir())]
    pub data_dir: PathBuf,

    /// The two conditions to discriminate. Default: face / house.
    #[builder(default)]
    pub targets: TargetClasses,

    // === Preprocessing ===
    /// Smoothing and standardization. Default: 4mm FWHM, standardized.
    #[builder(default)]
    pub masker: MaskerParams,

    /// Directory for memoized masking results. Default: `nilearn_cache`.
    #[builder(into, default = PathBuf::from("nilearn_cache"))]
    pub cache_dir: PathBuf,

    /// Reuse and store masking results. Default: true.
    #[builder(default = true)]
    pub use_cache: bool,

    // === Model ===
    /// Features kept by the ANOVA selector. Default: 500.
    #[builder(default)]
    pub n_features: SelectionSize,

    /// Linear SVM parameters, including the seed. Default: C = 1.
    #[builder(default)]
    pub svm: LinearSvcParams,

    // === Validation ===
    /// Cross-validation scheme. Default: 3-fold stratified.
    #[builder(default)]
    pub cv: CvScheme,

    /// Folds for the k-fold schemes. Default: 3.
    #[builder(default = 3)]
    pub n_folds: usize,

    // === Outputs ===
    /// Weight map destination. Default: `haxby_face_vs_house.nii`.
    #[builder(into, default = PathBuf::from("haxby_face_vs_house.nii"))]
    pub output: PathBuf,

    /// Rendered map destination. Default: `haxby_face_vs_house.png`.
    #[builder(into, default = PathBuf::from("haxby_face_vs_house.png"))]
    pub plot_path: PathBuf,

    /// Render the map at all. Default: true.
    #[builder(default = true)]
    pub render_plot: bool,

    /// Optional JSON run report.
    #[builder(into)]
    pub report: Option<PathBuf>,
}

/// Custom finishing function that validates the config.
impl<S: decoding_config_builder::IsComplete> DecodingConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a negative or non-finite smoothing width,
    /// `n_features == 0`, `n_folds < 2`, or non-positive solver settings.
    pub fn build(self) -> Result<DecodingConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl DecodingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fwhm) = self.masker.smoothing_fwhm {
            if !fwhm.is_finite() || fwhm < 0.0 {
                return Err(ConfigError::InvalidSmoothing(fwhm));
            }
        }
        if self.n_features == SelectionSize::K(0) {
            return Err(ConfigError::InvalidFeatureCount);
        }
        if self.n_folds < 2 {
            return Err(ConfigError::InvalidFolds(self.n_folds));
        }

        let svm = &self.svm;
        for (field, value) in [
            ("C", svm.c),
            ("tol", svm.tol),
            ("max_iter", svm.max_iter as f64),
            ("intercept_scaling", svm.intercept_scaling),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::InvalidSolver { field, value });
            }
        }
        Ok(())
    }
}

impl Default for DecodingConfig {
    fn default() -> Self {
        // Builder defaults always pass validation.
        Self::builder().__build_internal()
    }
}
