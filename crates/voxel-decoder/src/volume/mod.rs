//! In-memory brain volumes.
//!
//! [`Volume3`] holds a single 3D image (mask, anatomical, weight map) and
//! [`Volume4`] a functional series with time on the last axis. Both keep the
//! NIfTI header they were read from so results can be written back into the
//! same space.
//!
//! Arrays are indexed `[x, y, z]` / `[x, y, z, t]` regardless of the memory
//! layout produced by the reader.

mod nifti_io;
mod smooth;

pub use nifti_io::{read_volume3, read_volume4, write_volume3, write_volume4};
pub use smooth::{fwhm_to_sigma, gaussian_smooth, smoothing_sigmas};

use ndarray::{Array3, Array4, ArrayView3, Axis};
use nifti::NiftiHeader;

/// Errors raised while reading, writing or reshaping volumes.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("{path}: expected a {expected}D image, got dimensions {got:?}")]
    Dimensionality {
        path: String,
        expected: usize,
        got: Vec<usize>,
    },

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("volume has an empty time axis")]
    EmptySeries,
}

/// Voxel size in millimetres along x, y, z from a header's `pixdim`.
///
/// Zero or non-finite entries fall back to 1mm.
pub fn voxel_size(header: &NiftiHeader) -> [f32; 3] {
    let mut size = [1.0f32; 3];
    for (axis, slot) in size.iter_mut().enumerate() {
        let d = header.pixdim[axis + 1].abs();
        if d.is_finite() && d > 0.0 {
            *slot = d;
        }
    }
    size
}

/// Header for an image of the given voxel size, used for volumes built in memory.
pub fn header_with_voxel_size(voxel: [f32; 3]) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.pixdim[1] = voxel[0];
    header.pixdim[2] = voxel[1];
    header.pixdim[3] = voxel[2];
    header
}

/// A 3D image.
#[derive(Debug, Clone)]
pub struct Volume3 {
    data: Array3<f32>,
    header: NiftiHeader,
}

impl Volume3 {
    pub fn new(data: Array3<f32>, header: NiftiHeader) -> Self {
        Self { data, header }
    }

    /// Build a volume with a synthetic header of the given voxel size.
    pub fn from_array(data: Array3<f32>, voxel: [f32; 3]) -> Self {
        Self::new(data, header_with_voxel_size(voxel))
    }

    #[inline]
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    #[inline]
    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    #[inline]
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.data.dim();
        [x, y, z]
    }

    pub fn voxel_size(&self) -> [f32; 3] {
        voxel_size(&self.header)
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }
}

/// A 4D functional series, time on the last axis.
#[derive(Debug, Clone)]
pub struct Volume4 {
    data: Array4<f32>,
    header: NiftiHeader,
}

impl Volume4 {
    pub fn new(data: Array4<f32>, header: NiftiHeader) -> Self {
        Self { data, header }
    }

    /// Build a series with a synthetic header of the given voxel size.
    pub fn from_array(data: Array4<f32>, voxel: [f32; 3]) -> Self {
        Self::new(data, header_with_voxel_size(voxel))
    }

    #[inline]
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    #[inline]
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// Spatial shape `[x, y, z]`.
    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (x, y, z, _) = self.data.dim();
        [x, y, z]
    }

    /// Number of time frames (samples).
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// View of a single time frame.
    #[inline]
    pub fn frame(&self, t: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(3), t)
    }

    pub fn voxel_size(&self) -> [f32; 3] {
        voxel_size(&self.header)
    }

    /// Voxel-wise mean over time, used as a display background.
    pub fn mean_volume(&self) -> Result<Volume3, VolumeError> {
        let mean = self
            .data
            .mean_axis(Axis(3))
            .ok_or(VolumeError::EmptySeries)?;
        Ok(Volume3::new(mean, self.header.clone()))
    }
}
