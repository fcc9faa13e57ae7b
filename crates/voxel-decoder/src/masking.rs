//! Conversion between functional volumes and sample-by-voxel matrices.
//!
//! [`VolumeMasker`] flattens each frame of a 4D series into one row of a
//! `[n_frames, n_voxels]` matrix, keeping only voxels inside a [`BrainMask`].
//! Frames are optionally smoothed before masking, and columns optionally
//! z-scored (per session when sessions are supplied).
//!
//! Voxel order is row-major over `(x, y, z)`, so column `j` always refers to
//! the same voxel in both directions of the transform.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::KeyBuilder;
use crate::volume::{gaussian_smooth, smoothing_sigmas, Volume3, Volume4};

/// Errors raised by the masker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaskingError {
    #[error("mask selects no voxels")]
    EmptyMask,

    #[error("image shape {image:?} does not match mask shape {mask:?}")]
    ShapeMismatch { image: [usize; 3], mask: [usize; 3] },

    #[error("{sessions} session ids supplied for {frames} frames")]
    SessionLengthMismatch { sessions: usize, frames: usize },

    #[error("expected {expected} features, got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },
}

// =============================================================================
// BrainMask
// =============================================================================

/// Boolean spatial mask with the coordinates of its in-mask voxels.
#[derive(Debug, Clone)]
pub struct BrainMask {
    inside: Array3<bool>,
    voxels: Vec<[usize; 3]>,
    reference: Volume3,
}

impl BrainMask {
    /// Voxels with a finite, non-zero value are inside the mask.
    pub fn from_volume(volume: &Volume3) -> Result<Self, MaskingError> {
        let inside = volume.data().mapv(|v| v.is_finite() && v != 0.0);
        let voxels: Vec<[usize; 3]> = inside
            .indexed_iter()
            .filter_map(|((x, y, z), &keep)| keep.then_some([x, y, z]))
            .collect();
        if voxels.is_empty() {
            return Err(MaskingError::EmptyMask);
        }
        Ok(Self {
            inside,
            voxels,
            reference: volume.clone(),
        })
    }

    #[inline]
    pub fn n_voxels(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.reference.shape()
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        self.inside[[x, y, z]]
    }

    /// In-mask voxel coordinates in column order.
    pub fn voxels(&self) -> &[[usize; 3]] {
        &self.voxels
    }

    /// The volume the mask was built from; supplies header and geometry.
    pub fn reference(&self) -> &Volume3 {
        &self.reference
    }

    fn check_shape(&self, image: [usize; 3]) -> Result<(), MaskingError> {
        if image != self.shape() {
            return Err(MaskingError::ShapeMismatch {
                image,
                mask: self.shape(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// MaskerParams
// =============================================================================

/// Preprocessing applied while masking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskerParams {
    /// Gaussian smoothing FWHM in millimetres. `None` disables smoothing.
    pub smoothing_fwhm: Option<f32>,
    /// Z-score each column (within each session when sessions are given).
    pub standardize: bool,
}

impl Default for MaskerParams {
    fn default() -> Self {
        Self {
            smoothing_fwhm: Some(4.0),
            standardize: true,
        }
    }
}

impl MaskerParams {
    /// Feed the parameters into a cache key.
    pub fn hash_into(&self, key: &mut KeyBuilder) {
        let fwhm = self.smoothing_fwhm.unwrap_or(0.0);
        key.field("smoothing_fwhm", &fwhm.to_le_bytes());
        key.field("standardize", &[self.standardize as u8]);
    }
}

// =============================================================================
// VolumeMasker
// =============================================================================

/// Masks, smooths and standardizes functional series.
#[derive(Debug, Clone)]
pub struct VolumeMasker {
    mask: BrainMask,
    params: MaskerParams,
}

impl VolumeMasker {
    pub fn new(mask: BrainMask, params: MaskerParams) -> Self {
        Self { mask, params }
    }

    pub fn mask(&self) -> &BrainMask {
        &self.mask
    }

    pub fn params(&self) -> &MaskerParams {
        &self.params
    }

    /// Mask a 4D series into a `[n_frames, n_voxels]` matrix.
    ///
    /// `sessions`, when given, must have one entry per frame; standardization
    /// is then done independently within each session.
    pub fn transform(
        &self,
        series: &Volume4,
        sessions: Option<&[u32]>,
    ) -> Result<Array2<f32>, MaskingError> {
        self.mask.check_shape(series.spatial_shape())?;
        let n_frames = series.n_frames();
        if let Some(s) = sessions {
            if s.len() != n_frames {
                return Err(MaskingError::SessionLengthMismatch {
                    sessions: s.len(),
                    frames: n_frames,
                });
            }
        }

        let sigmas = self
            .params
            .smoothing_fwhm
            .filter(|&f| f > 0.0)
            .map(|f| smoothing_sigmas(f, series.voxel_size()));

        info!(
            n_frames,
            n_voxels = self.mask.n_voxels(),
            smoothing = ?self.params.smoothing_fwhm,
            standardize = self.params.standardize,
            "masking functional series"
        );

        let mut features = Array2::<f32>::zeros((n_frames, self.mask.n_voxels()));
        for (t, mut row) in features.axis_iter_mut(Axis(0)).enumerate() {
            let frame = series.frame(t);
            let values = match sigmas {
                Some(sigmas) => {
                    let mut smoothed = frame.to_owned();
                    gaussian_smooth(&mut smoothed, sigmas);
                    self.extract(smoothed.view())
                }
                None => self.extract(frame),
            };
            row.assign(&values);
        }

        if self.params.standardize {
            match sessions {
                Some(sessions) => standardize_by_session(&mut features, sessions),
                None => standardize_columns(&mut features, None),
            }
        }

        debug!(shape = ?features.dim(), "masked feature matrix");
        Ok(features)
    }

    /// Values of the in-mask voxels of a single 3D image.
    pub fn transform_volume(&self, volume: &Volume3) -> Result<Array1<f32>, MaskingError> {
        self.mask.check_shape(volume.shape())?;
        Ok(self.extract(volume.view()))
    }

    fn extract(&self, frame: ArrayView3<'_, f32>) -> Array1<f32> {
        self.mask
            .voxels()
            .iter()
            .map(|&[x, y, z]| {
                let v = frame[[x, y, z]];
                if v.is_finite() {
                    v
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Scatter one feature vector back into a volume of the mask's shape.
    ///
    /// Voxels outside the mask are zero.
    pub fn inverse_transform(&self, features: ArrayView1<'_, f32>) -> Result<Volume3, MaskingError> {
        if features.len() != self.mask.n_voxels() {
            return Err(MaskingError::FeatureCountMismatch {
                expected: self.mask.n_voxels(),
                got: features.len(),
            });
        }
        let [nx, ny, nz] = self.mask.shape();
        let mut data = Array3::<f32>::zeros((nx, ny, nz));
        for (&[x, y, z], &v) in self.mask.voxels().iter().zip(features.iter()) {
            data[[x, y, z]] = v;
        }
        Ok(Volume3::new(data, self.mask.reference().header().clone()))
    }
}

// =============================================================================
// Standardization
// =============================================================================

/// Columns with a standard deviation below this are left unscaled.
const STD_EPS: f64 = f64::EPSILON;

/// Z-score the columns of `features`, restricted to `rows` when given.
fn standardize_columns(features: &mut Array2<f32>, rows: Option<&[usize]>) {
    let all: Vec<usize>;
    let rows = match rows {
        Some(r) => r,
        None => {
            all = (0..features.nrows()).collect();
            &all
        }
    };
    if rows.is_empty() {
        return;
    }
    let n = rows.len() as f64;

    for mut column in features.axis_iter_mut(Axis(1)) {
        let mean = rows.iter().map(|&r| column[r] as f64).sum::<f64>() / n;
        let var = rows
            .iter()
            .map(|&r| {
                let d = column[r] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let std = var.sqrt();
        let scale = if std < STD_EPS { 1.0 } else { std };
        for &r in rows {
            column[r] = ((column[r] as f64 - mean) / scale) as f32;
        }
    }
}

fn standardize_by_session(features: &mut Array2<f32>, sessions: &[u32]) {
    let mut ids = sessions.to_vec();
    ids.sort_unstable();
    ids.dedup();
    for id in ids {
        let rows: Vec<usize> = sessions
            .iter()
            .enumerate()
            .filter_map(|(r, &s)| (s == id).then_some(r))
            .collect();
        standardize_columns(features, Some(&rows));
    }
}
