//! NIfTI reading and writing through the `nifti` crate.

use std::path::Path;

use ndarray::{Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use tracing::debug;

use super::{Volume3, Volume4, VolumeError};

fn dimensionality_error(path: &Path, expected: usize, shape: &[usize]) -> VolumeError {
    VolumeError::Dimensionality {
        path: path.display().to_string(),
        expected,
        got: shape.to_vec(),
    }
}

/// Read a 3D image. A 4D file with a single frame is accepted.
pub fn read_volume3(path: &Path) -> Result<Volume3, VolumeError> {
    let object = ReaderOptions::new().read_file(path)?;
    let header = object.header().clone();
    let data = object.into_volume().into_ndarray::<f32>()?;

    let shape = data.shape().to_vec();
    let data = match shape.len() {
        3 => data.into_dimensionality::<Ix3>()?,
        4 if shape[3] == 1 => data
            .index_axis_move(Axis(3), 0)
            .into_dimensionality::<Ix3>()?,
        _ => return Err(dimensionality_error(path, 3, &shape)),
    };

    debug!(path = %path.display(), shape = ?data.dim(), "read 3D volume");
    Ok(Volume3::new(data, header))
}

/// Read a 4D functional series.
pub fn read_volume4(path: &Path) -> Result<Volume4, VolumeError> {
    let object = ReaderOptions::new().read_file(path)?;
    let header = object.header().clone();
    let data = object.into_volume().into_ndarray::<f32>()?;

    let shape = data.shape().to_vec();
    if shape.len() != 4 {
        return Err(dimensionality_error(path, 4, &shape));
    }
    let data = data.into_dimensionality::<Ix4>()?;

    debug!(path = %path.display(), shape = ?data.dim(), "read 4D volume");
    Ok(Volume4::new(data, header))
}

/// Write a 3D image as float32 NIfTI-1.
///
/// The volume's header supplies the spatial metadata (voxel size, affine);
/// dimensions and intensity scaling are reset to match the written data.
pub fn write_volume3(volume: &Volume3, path: &Path) -> Result<(), VolumeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let [x, y, z] = volume.shape();
    let mut header = volume.header().clone();
    header.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(volume.data())?;

    debug!(path = %path.display(), shape = ?volume.shape(), "wrote 3D volume");
    Ok(())
}

/// Write a 4D series as float32 NIfTI-1, same header handling as [`write_volume3`].
pub fn write_volume4(volume: &Volume4, path: &Path) -> Result<(), VolumeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let [x, y, z] = volume.spatial_shape();
    let t = volume.n_frames();
    let mut header = volume.header().clone();
    header.dim = [4, x as u16, y as u16, z as u16, t as u16, 1, 1, 1];
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(volume.data())?;

    debug!(path = %path.display(), shape = ?volume.data().dim(), "wrote 4D volume");
    Ok(())
}
