//! Seeded synthetic data for tests and benchmarks.

use std::fs;
use std::path::Path;

use ndarray::{Array2, Array3, Array4};
use rand::prelude::*;

use crate::fetch::HaxbyDataset;
use crate::volume::{write_volume3, write_volume4, Volume3, Volume4, VolumeError};

/// Two-class feature matrix with alternating `face` / `house` labels.
///
/// Values are uniform noise in `[-1, 1]`; the first `n_informative` columns
/// are shifted by `+effect` for `house` rows and `-effect` for `face` rows.
pub fn two_class_features(
    n_samples: usize,
    n_features: usize,
    n_informative: usize,
    effect: f32,
    seed: u64,
) -> (Array2<f32>, Vec<String>) {
    assert!(n_informative <= n_features);
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<String> = (0..n_samples)
        .map(|i| if i % 2 == 0 { "face" } else { "house" }.to_string())
        .collect();

    let x = Array2::from_shape_fn((n_samples, n_features), |(i, j)| {
        let noise = rng.gen_range(-1.0f32..=1.0);
        if j < n_informative {
            let sign = if i % 2 == 0 { -1.0 } else { 1.0 };
            noise + sign * effect
        } else {
            noise
        }
    });
    (x, labels)
}

/// Shape and content of a synthetic on-disk dataset.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub shape: [usize; 3],
    pub n_sessions: u32,
    /// Condition of each frame within a session.
    pub block: Vec<&'static str>,
    /// Signal added to responsive voxels.
    pub effect: f32,
    pub seed: u64,
}

impl Default for SyntheticDataset {
    fn default() -> Self {
        Self {
            shape: [8, 7, 5],
            n_sessions: 4,
            block: vec![
                "rest", "face", "house", "cat", "face", "house", "rest", "house", "face",
            ],
            effect: 2.0,
            seed: 7,
        }
    }
}

impl SyntheticDataset {
    /// Brain mask: every voxel except a one-voxel border.
    pub fn mask(&self) -> Array3<f32> {
        let [nx, ny, nz] = self.shape;
        Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
            let inside = (1..nx - 1).contains(&x) && (1..ny - 1).contains(&y) && (1..nz - 1).contains(&z);
            if inside {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Frame labels and session ids in acquisition order.
    pub fn labels(&self) -> (Vec<String>, Vec<u32>) {
        let mut labels = Vec::new();
        let mut sessions = Vec::new();
        for session in 0..self.n_sessions {
            for &label in &self.block {
                labels.push(label.to_string());
                sessions.push(session);
            }
        }
        (labels, sessions)
    }

    /// Series where voxels in the lower x half respond to `face` and the
    /// upper half to `house`, on top of uniform noise.
    pub fn series(&self) -> Array4<f32> {
        let [nx, ny, nz] = self.shape;
        let (labels, _) = self.labels();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut data = Array4::<f32>::zeros((nx, ny, nz, labels.len()));
        for ((x, _, _, t), v) in data.indexed_iter_mut() {
            let responsive = match labels[t].as_str() {
                "face" => x < nx / 2,
                "house" => x >= nx / 2,
                _ => false,
            };
            let signal = if responsive { self.effect } else { 0.0 };
            *v = 100.0 + signal + rng.gen_range(-1.0f32..=1.0);
        }
        data
    }

    /// Write every dataset file below `data_dir` in the fetched layout.
    pub fn write(&self, data_dir: &Path) -> Result<HaxbyDataset, VolumeError> {
        let dataset = HaxbyDataset::at(data_dir);
        let voxel = [3.0, 3.0, 3.0];

        let mask = Volume3::from_array(self.mask(), voxel);
        for path in [
            &dataset.mask,
            &dataset.anat,
            &dataset.mask_vt,
            &dataset.mask_face,
            &dataset.mask_house,
        ] {
            write_volume3(&mask, path)?;
        }
        write_volume4(&Volume4::from_array(self.series(), voxel), &dataset.func)?;

        let (labels, sessions) = self.labels();
        let mut table = String::from("labels chunks\n");
        for (label, session) in labels.iter().zip(&sessions) {
            table.push_str(&format!("{label} {session}\n"));
        }
        fs::write(&dataset.session_target, table)?;
        Ok(dataset)
    }
}
