//! End-to-end face-vs-house decoding run.
//!
//! Stages, strictly in order:
//!
//! 1. fetch the dataset (skipped when already on disk)
//! 2. load the label table and build the condition mask
//! 3. mask, smooth and standardize the functional series (memoized)
//! 4. restrict samples to the two target conditions
//! 5. fit ANOVA + SVM on all samples and cross-validate a fresh copy
//! 6. map the SVM weights back to a brain volume, save and render it

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheError, KeyBuilder, MaskingCache};
use crate::config::DecodingConfig;
use crate::estimator::{
    AnovaSvm, Classifier, EstimatorError, LinearSvc, Pipeline, SelectKBest,
};
use crate::fetch::{DatasetFetcher, FetchError, HaxbyDataset};
use crate::labels::{ConditionMask, LabelError, LabelTable};
use crate::masking::{BrainMask, MaskingError, VolumeMasker};
use crate::report::{RenderError, StatMapPlot};
use crate::validation::{
    accuracy, chance_level, cross_val_score, CvScheme, CvScores, ValidationError,
};
use crate::volume::{read_volume3, read_volume4, write_volume3, Volume4, VolumeError};

/// Any failure of a decoding run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("fetching dataset: {0}")]
    Fetch(#[from] FetchError),

    #[error("loading labels: {0}")]
    Labels(#[from] LabelError),

    #[error("volume I/O: {0}")]
    Volume(#[from] VolumeError),

    #[error("masking: {0}")]
    Masking(#[from] MaskingError),

    #[error("masking cache: {0}")]
    Cache(#[from] CacheError),

    #[error("model: {0}")]
    Estimator(#[from] EstimatorError),

    #[error("cross-validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("rendering map: {0}")]
    Render(#[from] RenderError),

    #[error("functional series has {frames} frames but label table has {labels} rows")]
    FrameCountMismatch { frames: usize, labels: usize },

    #[error("writing report {path}: {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Summary of a run, also written as the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct DecodingReport {
    pub mask: PathBuf,
    pub func: PathBuf,
    pub targets: Vec<String>,
    /// Samples kept after condition filtering.
    pub n_samples: usize,
    pub n_voxels: usize,
    pub n_selected: usize,
    pub cv_scheme: CvScheme,
    pub cv_splitter: String,
    pub cv_scores: CvScores,
    /// Mean of `cv_scores`.
    pub accuracy: f64,
    pub chance_level: f64,
    /// Accuracy of the full fit on its own training samples.
    pub training_accuracy: f64,
    /// Leave-two-sessions-out score, when the reported scheme ignores sessions.
    pub session_aware_scores: Option<CvScores>,
    pub weight_map: PathBuf,
    pub plot: Option<PathBuf>,
    /// Slice coordinates of the rendered map.
    pub cut_coords: Option<[usize; 3]>,
    pub cache_hit: bool,
}

/// Build the unfitted decoder described by `config`.
pub fn decoder(config: &DecodingConfig) -> AnovaSvm {
    Pipeline::new(SelectKBest::new(config.n_features), LinearSvc::new(config.svm))
}

/// Fetch the dataset, print where it lives, and decode.
pub fn run(config: &DecodingConfig) -> Result<DecodingReport, WorkflowError> {
    let dataset = DatasetFetcher::new(&config.data_dir).fetch()?;
    println!("Mask nifti image (3D) is located at: {}", dataset.mask.display());
    println!("Functional nifti image (4D) is located at: {}", dataset.func.display());
    run_on_dataset(&dataset, config)
}

/// Decode an already fetched dataset.
pub fn run_on_dataset(
    dataset: &HaxbyDataset,
    config: &DecodingConfig,
) -> Result<DecodingReport, WorkflowError> {
    // Labels
    let table = LabelTable::load(&dataset.session_target)?;
    let condition = ConditionMask::from_labels(table.labels(), &config.targets);
    info!(
        n_frames = table.len(),
        n_selected = condition.n_selected(),
        targets = ?config.targets.as_slice(),
        "loaded label table"
    );

    // Volumes
    let brain = BrainMask::from_volume(&read_volume3(&dataset.mask)?)?;
    let series = read_volume4(&dataset.func)?;
    if series.n_frames() != table.len() {
        return Err(WorkflowError::FrameCountMismatch {
            frames: series.n_frames(),
            labels: table.len(),
        });
    }
    if series.spatial_shape() != brain.shape() {
        return Err(MaskingError::ShapeMismatch {
            image: series.spatial_shape(),
            mask: brain.shape(),
        }
        .into());
    }
    let background = series.mean_volume()?;

    // Features
    let masker = VolumeMasker::new(brain, config.masker);
    let (features, cache_hit) = masked_features(&masker, &series, dataset, table.sessions(), config)?;

    let x = condition.select_rows(features.view())?;
    let filtered = table.filter(&condition)?;
    let y = filtered.labels();
    let sessions = filtered.sessions();
    info!(shape = ?x.dim(), "feature matrix restricted to target conditions");

    // Full fit
    let mut model = decoder(config);
    model.fit(x.view(), y)?;
    let y_pred = model.predict(x.view())?;
    let training_accuracy = accuracy(&y_pred, y);
    info!(training_accuracy, "fitted decoder on all samples");

    // Cross-validation
    let splitter = config.cv.splitter(config.n_folds);
    let groups = config.cv.groups(sessions);
    let cv_scores = cross_val_score(&decoder(config), x.view(), y, groups.as_deref(), splitter.as_ref())?;
    let mean_accuracy = cv_scores.mean();
    let chance = chance_level(y);

    let session_aware_scores = if config.cv.uses_sessions() {
        None
    } else {
        session_aware_check(config, &x, y, sessions, mean_accuracy)
    };

    // Weight map
    let coef = model.classifier().coef()?.insert_axis(Axis(0));
    let full = model.inverse_transform(coef)?;
    let weights = masker.inverse_transform(full.row(0))?;
    write_volume3(&weights, &config.output)?;
    info!(path = %config.output.display(), "saved weight map");

    let (plot, cut_coords) = if config.render_plot {
        let cut = StatMapPlot::default().render(&weights, &background, &config.plot_path)?;
        (Some(config.plot_path.clone()), Some(cut))
    } else {
        (None, None)
    };

    let report = DecodingReport {
        mask: dataset.mask.clone(),
        func: dataset.func.clone(),
        targets: config.targets.as_slice().to_vec(),
        n_samples: x.nrows(),
        n_voxels: masker.mask().n_voxels(),
        n_selected: model.selector().support()?.len(),
        cv_scheme: config.cv,
        cv_splitter: splitter.describe(),
        cv_scores,
        accuracy: mean_accuracy,
        chance_level: chance,
        training_accuracy,
        session_aware_scores,
        weight_map: config.output.clone(),
        plot,
        cut_coords,
        cache_hit,
    };

    if let Some(path) = &config.report {
        write_report(&report, path)?;
    }
    Ok(report)
}

/// Masked feature matrix for the whole series, from the cache when possible.
fn masked_features(
    masker: &VolumeMasker,
    series: &Volume4,
    dataset: &HaxbyDataset,
    sessions: &[u32],
    config: &DecodingConfig,
) -> Result<(Array2<f32>, bool), WorkflowError> {
    if !config.use_cache {
        return Ok((masker.transform(series, Some(sessions))?, false));
    }

    let cache = MaskingCache::new(&config.cache_dir);
    let mut key = KeyBuilder::new("masking");
    key.file(&dataset.func)?.file(&dataset.mask)?;
    masker.params().hash_into(&mut key);
    let session_bytes: Vec<u8> = sessions.iter().flat_map(|s| s.to_le_bytes()).collect();
    key.field("sessions", &session_bytes);
    let key = key.finish();

    if let Some(features) = cache.get(&key) {
        if features.dim() == (series.n_frames(), masker.mask().n_voxels()) {
            info!(key = %key, "reusing cached masking result");
            return Ok((features, true));
        }
        warn!(key = %key, shape = ?features.dim(), "cached masking result has wrong shape");
    }

    let features = masker.transform(series, Some(sessions))?;
    if let Err(err) = cache.put(&key, features.view()) {
        warn!(error = %err, "could not store masking result");
    }
    Ok((features, false))
}

/// Score the session-aware scheme the reported default ignores, and warn
/// about the difference. Failures only produce a warning.
fn session_aware_check(
    config: &DecodingConfig,
    x: &Array2<f32>,
    y: &[String],
    sessions: &[u32],
    reported: f64,
) -> Option<CvScores> {
    let scheme = CvScheme::LeaveTwoSessionsOut;
    let groups = scheme.groups(sessions);
    let splitter = scheme.splitter(config.n_folds);
    match cross_val_score(&decoder(config), x.view(), y, groups.as_deref(), splitter.as_ref()) {
        Ok(scores) => {
            warn!(
                reported,
                session_aware = scores.mean(),
                "reported accuracy uses folds that ignore sessions; \
                 leave-two-sessions-out accuracy differs (use --cv leave-two-sessions-out to report it)"
            );
            Some(scores)
        }
        Err(err) => {
            warn!(error = %err, "session-aware cross-validation skipped");
            None
        }
    }
}

fn write_report(report: &DecodingReport, path: &Path) -> Result<(), WorkflowError> {
    let report_error = |source| WorkflowError::Report {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(report_error)?;
    }
    let file = fs::File::create(path).map_err(report_error)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .map_err(|err| report_error(err.into()))?;
    info!(path = %path.display(), "wrote run report");
    Ok(())
}
