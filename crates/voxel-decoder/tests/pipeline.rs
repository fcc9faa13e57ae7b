//! Decoder behaviour across module boundaries: label filtering, selection,
//! classification, cross-validation and mapping weights back to volumes.

use approx::assert_relative_eq;
use ndarray::{array, Array3, Axis};
use voxel_decoder::estimator::EstimatorError;
use voxel_decoder::testing::two_class_features;
use voxel_decoder::validation::{chance_level, LeaveOneGroupOut, StratifiedKFold};
use voxel_decoder::{
    cross_val_score, BrainMask, Classifier, ConditionMask, LabelTable, LinearSvc, MaskerParams,
    Pipeline, SelectKBest, SelectionSize, TargetClasses, Volume3, VolumeMasker,
};

fn decoder(size: SelectionSize) -> Pipeline<SelectKBest, LinearSvc> {
    Pipeline::new(SelectKBest::new(size), LinearSvc::default())
}

#[test]
fn four_sample_session_scenario() {
    let table = LabelTable::parse(
        "labels chunks\nface 0\nhouse 0\nface 1\nhouse 1\n",
        "labels",
        "chunks",
    )
    .unwrap();
    let features = array![
        [1.0f32, 0.2, -0.5],
        [-1.0, 0.1, 0.4],
        [0.9, -0.3, -0.6],
        [-1.1, 0.0, 0.5]
    ];

    let condition = ConditionMask::from_labels(table.labels(), &TargetClasses::default());
    let x = condition.select_rows(features.view()).unwrap();
    let filtered = table.filter(&condition).unwrap();

    assert_eq!(x.nrows(), 4);
    assert_eq!(filtered.labels().len(), 4);
    assert_eq!(filtered.sessions().len(), 4);

    let scores = cross_val_score(
        &decoder(SelectionSize::All),
        x.view(),
        filtered.labels(),
        Some(filtered.sessions()),
        &LeaveOneGroupOut,
    )
    .unwrap();
    assert_eq!(scores.len(), 2);
    assert_relative_eq!(scores.mean(), scores.scores().iter().sum::<f64>() / 2.0);
    assert_relative_eq!(chance_level(filtered.labels()), 0.5);
}

#[test]
fn filtering_keeps_only_target_rows() {
    let table = LabelTable::parse(
        "labels chunks\nrest 0\nface 0\ncat 0\nhouse 1\nface 1\nscissors 1\n",
        "labels",
        "chunks",
    )
    .unwrap();
    let features = ndarray::Array2::from_shape_fn((6, 2), |(i, j)| (i * 10 + j) as f32);

    let condition = ConditionMask::from_labels(table.labels(), &TargetClasses::default());
    let x = condition.select_rows(features.view()).unwrap();
    let filtered = table.filter(&condition).unwrap();

    assert_eq!(x.nrows(), filtered.len());
    assert_eq!(filtered.sessions(), &[0, 1, 1]);
    assert!(filtered.labels().iter().all(|l| l == "face" || l == "house"));
    assert_eq!(x.column(0).to_vec(), vec![10.0, 30.0, 40.0]);
}

#[test]
fn missing_targets_surface_as_empty_input() {
    let table = LabelTable::parse("labels chunks\nrest 0\ncat 1\n", "labels", "chunks").unwrap();
    let features = array![[1.0f32, 2.0], [3.0, 4.0]];

    let condition = ConditionMask::from_labels(table.labels(), &TargetClasses::default());
    let x = condition.select_rows(features.view()).unwrap();
    let filtered = table.filter(&condition).unwrap();
    assert_eq!(x.nrows(), 0);

    let mut model = decoder(SelectionSize::K(1));
    assert!(matches!(
        model.fit(x.view(), filtered.labels()),
        Err(EstimatorError::EmptyInput(_))
    ));
}

#[test]
fn fit_predict_is_deterministic() {
    let (x, y) = two_class_features(60, 40, 4, 0.8, 11);

    let mut a = decoder(SelectionSize::K(10));
    let mut b = decoder(SelectionSize::K(10));
    a.fit(x.view(), &y).unwrap();
    b.fit(x.view(), &y).unwrap();

    assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());
    assert_eq!(a.classifier().coef().unwrap(), b.classifier().coef().unwrap());
    assert_eq!(a.selector().support().unwrap(), b.selector().support().unwrap());
}

#[test]
fn informative_features_are_selected_and_decoded() {
    let (x, y) = two_class_features(90, 60, 5, 1.5, 3);

    let mut model = decoder(SelectionSize::K(5));
    model.fit(x.view(), &y).unwrap();
    assert_eq!(model.selector().support().unwrap(), &[0, 1, 2, 3, 4]);

    let scores =
        cross_val_score(&decoder(SelectionSize::K(5)), x.view(), &y, None, &StratifiedKFold::new(3))
            .unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores.mean() > 0.9, "mean accuracy {}", scores.mean());
}

#[test]
fn weights_round_trip_into_mask_space() {
    // 3x3x2 grid, 5 voxels in the mask
    let mut mask = Array3::<f32>::zeros((3, 3, 2));
    for &(i, j, k) in &[(0, 0, 0), (1, 1, 0), (2, 1, 1), (0, 2, 1), (1, 0, 1)] {
        mask[[i, j, k]] = 1.0;
    }
    let masker = VolumeMasker::new(
        BrainMask::from_volume(&Volume3::from_array(mask.clone(), [3.0; 3])).unwrap(),
        MaskerParams {
            smoothing_fwhm: None,
            standardize: false,
        },
    );

    let (x, y) = two_class_features(40, 5, 2, 2.0, 5);
    let mut model = decoder(SelectionSize::K(2));
    model.fit(x.view(), &y).unwrap();

    let coef = model.classifier().coef().unwrap().insert_axis(Axis(0));
    let full = model.inverse_transform(coef).unwrap();
    let volume = masker.inverse_transform(full.row(0)).unwrap();

    assert_eq!(volume.shape(), [3, 3, 2]);
    let support = model.selector().support().unwrap();
    for (column, &[i, j, k]) in masker.mask().voxels().iter().enumerate() {
        let value = volume.data()[[i, j, k]];
        if support.contains(&column) {
            assert_ne!(value, 0.0);
        } else {
            assert_eq!(value, 0.0);
        }
    }
    for ((i, j, k), &m) in mask.indexed_iter() {
        if m == 0.0 {
            assert_eq!(volume.data()[[i, j, k]], 0.0);
        }
    }
}
