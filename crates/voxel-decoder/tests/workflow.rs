//! Full runs over a synthetic dataset written to a temporary directory.

use std::path::Path;

use voxel_decoder::config::DecodingConfig;
use voxel_decoder::testing::SyntheticDataset;
use voxel_decoder::volume::read_volume3;
use voxel_decoder::workflow::{run, run_on_dataset};
use voxel_decoder::{CvScheme, SelectionSize, WorkflowError};

fn config(root: &Path) -> DecodingConfig {
    DecodingConfig::builder()
        .data_dir(root.join("data"))
        .cache_dir(root.join("cache"))
        .n_features(SelectionSize::K(20))
        .output(root.join("out").join("weights.nii.gz"))
        .render_plot(false)
        .report(root.join("out").join("report.json"))
        .build()
        .unwrap()
}

#[test]
fn decodes_synthetic_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let spec = SyntheticDataset::default();
    let dataset = spec.write(&dir.path().join("data")).unwrap();
    let config = config(dir.path());

    let report = run_on_dataset(&dataset, &config).unwrap();

    // 3 face + 3 house frames per session, 4 sessions
    assert_eq!(report.n_samples, 24);
    assert_eq!(report.n_voxels, 90);
    assert_eq!(report.n_selected, 20);
    assert_eq!(report.cv_scores.len(), 3);
    assert_eq!(report.chance_level, 0.5);
    assert!(report.accuracy > 0.8, "accuracy {}", report.accuracy);
    assert!(report.training_accuracy > 0.9);
    assert_eq!(report.session_aware_scores.as_ref().map(|s| s.len()), Some(2));
    assert!(!report.cache_hit);

    let weights = read_volume3(&config.output).unwrap();
    assert_eq!(weights.shape(), spec.shape);
    let mask = spec.mask();
    let nonzero = weights.data().iter().filter(|&&w| w != 0.0).count();
    assert!(nonzero <= 20);
    for ((x, y, z), &w) in weights.data().indexed_iter() {
        if mask[[x, y, z]] == 0.0 {
            assert_eq!(w, 0.0);
        }
    }

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config.report.as_ref().unwrap()).unwrap())
            .unwrap();
    assert_eq!(json["n_samples"], 24);
    assert_eq!(json["cv_scheme"], "default");
    assert_eq!(json["cv_scores"]["scores"].as_array().unwrap().len(), 3);
}

#[test]
fn second_run_reuses_masking_cache() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = SyntheticDataset::default()
        .write(&dir.path().join("data"))
        .unwrap();
    let config = config(dir.path());

    let first = run_on_dataset(&dataset, &config).unwrap();
    let second = run_on_dataset(&dataset, &config).unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.cv_scores, second.cv_scores);
    assert_eq!(first.training_accuracy, second.training_accuracy);
}

#[test]
fn session_scheme_reports_one_score_per_group() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = SyntheticDataset::default()
        .write(&dir.path().join("data"))
        .unwrap();
    let mut config = config(dir.path());
    config.cv = CvScheme::LeaveOneSessionOut;
    config.use_cache = false;

    let report = run_on_dataset(&dataset, &config).unwrap();
    assert_eq!(report.cv_scores.len(), 4);
    assert!(report.session_aware_scores.is_none());
}

#[test]
fn run_skips_fetch_when_dataset_present() {
    let dir = tempfile::tempdir().unwrap();
    SyntheticDataset::default()
        .write(&dir.path().join("data"))
        .unwrap();

    let report = run(&config(dir.path())).unwrap();
    assert_eq!(report.n_samples, 24);
}

#[test]
fn label_count_must_match_frames() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = SyntheticDataset::default()
        .write(&dir.path().join("data"))
        .unwrap();
    std::fs::write(&dataset.session_target, "labels chunks\nface 0\nhouse 0\n").unwrap();

    let err = run_on_dataset(&dataset, &config(dir.path())).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::FrameCountMismatch { frames: 36, labels: 2 }
    ));
}
