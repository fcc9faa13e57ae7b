//! Separable Gaussian smoothing of 3D images.
//!
//! Smoothing width is given as a full width at half maximum (FWHM) in
//! millimetres and converted to a per-axis sigma in voxels:
//!
//! ```text
//! sigma_axis = fwhm / (sqrt(8 ln 2) * voxel_size_axis)
//! ```
//!
//! Each axis is filtered with a normalized 1D kernel truncated at 4 sigma,
//! using half-sample symmetric reflection at the borders.

use ndarray::{Array3, Axis};

/// Kernel half-width in units of sigma.
const TRUNCATE: f64 = 4.0;

/// Convert a FWHM to a Gaussian sigma (same units).
#[inline]
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (8.0 * std::f64::consts::LN_2).sqrt()
}

/// Per-axis sigma in voxels for a FWHM in millimetres.
pub fn smoothing_sigmas(fwhm_mm: f32, voxel_size: [f32; 3]) -> [f64; 3] {
    let sigma_mm = fwhm_to_sigma(fwhm_mm as f64);
    [
        sigma_mm / voxel_size[0] as f64,
        sigma_mm / voxel_size[1] as f64,
        sigma_mm / voxel_size[2] as f64,
    ]
}

/// Smooth a volume in place. Axes with a non-positive sigma are skipped.
///
/// Non-finite voxels are zeroed before filtering.
pub fn gaussian_smooth(volume: &mut Array3<f32>, sigmas: [f64; 3]) {
    volume.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });

    for (axis, &sigma) in sigmas.iter().enumerate() {
        if sigma <= 0.0 || !sigma.is_finite() {
            continue;
        }
        let kernel = gaussian_kernel(sigma);
        let len = volume.len_of(Axis(axis));
        let mut buffer = vec![0.0f32; len];
        for mut lane in volume.lanes_mut(Axis(axis)) {
            for (slot, &v) in buffer.iter_mut().zip(lane.iter()) {
                *slot = v;
            }
            for (i, out) in lane.iter_mut().enumerate() {
                *out = convolve_at(&buffer, &kernel, i);
            }
        }
    }
}

/// Normalized, symmetric kernel of radius `round(TRUNCATE * sigma)`.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

fn convolve_at(signal: &[f32], kernel: &[f64], i: usize) -> f32 {
    let radius = (kernel.len() / 2) as isize;
    let mut acc = 0.0f64;
    for (j, &k) in kernel.iter().enumerate() {
        let idx = reflect(i as isize + j as isize - radius, signal.len());
        acc += k * signal[idx] as f64;
    }
    acc as f32
}

/// Half-sample symmetric reflection: `d c b a | a b c d | d c b a`.
fn reflect(mut idx: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    let period = 2 * n;
    idx = idx.rem_euclid(period);
    if idx >= n {
        idx = period - 1 - idx;
    }
    idx as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fwhm_conversion() {
        // FWHM = 2.3548 * sigma
        assert_abs_diff_eq!(fwhm_to_sigma(2.354_820_045), 1.0, epsilon = 1e-6);
        let sigmas = smoothing_sigmas(4.0, [3.5, 3.75, 3.75]);
        assert_abs_diff_eq!(sigmas[0], 1.698_644_5 / 3.5, epsilon = 1e-5);
        assert!(sigmas[1] < sigmas[0]);
    }

    #[test]
    fn reflect_indices() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 4), 1);
        assert_eq!(reflect(-3, 1), 0);
    }

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(1.5);
        assert_eq!(kernel.len(), 2 * 6 + 1);
        assert_abs_diff_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for i in 0..kernel.len() / 2 {
            assert_abs_diff_eq!(kernel[i], kernel[kernel.len() - 1 - i], epsilon = 1e-15);
        }
    }

    #[test]
    fn smoothing_preserves_constant_and_mass() {
        let mut constant = Array3::<f32>::from_elem((5, 4, 3), 2.0);
        gaussian_smooth(&mut constant, [1.0, 1.0, 1.0]);
        for &v in constant.iter() {
            assert_abs_diff_eq!(v, 2.0, epsilon = 1e-5);
        }

        let mut impulse = Array3::<f32>::zeros((21, 1, 1));
        impulse[[10, 0, 0]] = 1.0;
        gaussian_smooth(&mut impulse, [1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(impulse.sum(), 1.0, epsilon = 1e-5);
        assert!(impulse[[10, 0, 0]] < 1.0);
        assert_abs_diff_eq!(impulse[[9, 0, 0]], impulse[[11, 0, 0]], epsilon = 1e-7);
    }

    #[test]
    fn non_finite_voxels_are_zeroed() {
        let mut volume = Array3::<f32>::zeros((3, 1, 1));
        volume[[1, 0, 0]] = f32::NAN;
        gaussian_smooth(&mut volume, [0.0, 0.0, 0.0]);
        assert_eq!(volume[[1, 0, 0]], 0.0);
    }
}
