use foldguard::{
    CorrelationScorer, CrossValidator, Dataset, DegeneratePolicy, FeatureScorer, FoldStrategy,
    LogisticRegression, NoiseDatasetBuilder,
};

fn validator() -> CrossValidator {
    CrossValidator {
        folds: 4,
        top_features: 3,
        seed: 17,
        strategy: FoldStrategy::Stratified,
        degenerate: DegeneratePolicy::Flag,
    }
}

/// Overwrites the held-out rows of `rows` with values that would dominate any
/// selection that looked at them: every feature equals the label.
fn poison_rows(data: &Dataset, rows: &[usize]) -> Dataset {
    let (mut features, mut labels) = data.clone().into_parts();
    for (k, &row) in rows.iter().enumerate() {
        let label = (k % 2) as u8;
        labels[row] = label;
        features.row_mut(row).fill(f64::from(label));
    }
    Dataset::new(features, labels).unwrap()
}

#[test]
fn selection_ignores_held_out_rows() {
    let data = NoiseDatasetBuilder::new(48, 400).seed(3).build().unwrap();
    let v = validator();
    let baseline = v
        .evaluate(&data, &CorrelationScorer, &LogisticRegression::default())
        .unwrap();
    let assignment = baseline.assignment().clone();

    for split in assignment.splits() {
        let poisoned = poison_rows(&data, &split.test);
        let rerun = v
            .evaluate_with_assignment(
                &poisoned,
                assignment.clone(),
                &CorrelationScorer,
                &LogisticRegression::default(),
            )
            .unwrap();
        assert_eq!(
            rerun.folds()[split.fold].selected_features,
            baseline.folds()[split.fold].selected_features,
            "fold {} selection changed when its held-out rows changed",
            split.fold
        );
        assert_eq!(
            v.select_features(&poisoned, &split, &CorrelationScorer).unwrap(),
            baseline.folds()[split.fold].selected_features
        );
    }
}

#[test]
fn selection_matches_scoring_with_held_out_rows_removed() {
    let data = NoiseDatasetBuilder::new(40, 250).seed(11).build().unwrap();
    let v = validator();
    let eval = v
        .evaluate(&data, &CorrelationScorer, &LogisticRegression::default())
        .unwrap();

    for split in eval.assignment().splits() {
        let train_only = data.rows(&split.train).unwrap();
        let ranking = CorrelationScorer.rank(train_only.features(), train_only.labels());
        assert_eq!(eval.folds()[split.fold].selected_features, ranking[..3].to_vec());
    }
}

#[test]
fn informative_columns_are_found_inside_each_fold() {
    let data = NoiseDatasetBuilder::new(100, 500)
        .seed(29)
        .informative(3, 0.1)
        .build()
        .unwrap();
    let eval = validator()
        .evaluate(&data, &CorrelationScorer, &LogisticRegression::default())
        .unwrap();
    for fold in eval.folds() {
        let mut chosen = fold.selected_features.clone();
        chosen.sort_unstable();
        assert_eq!(chosen, vec![0, 1, 2], "fold {}", fold.fold);
    }
    assert!(eval.mean_error() < 0.2, "mean error {}", eval.mean_error());
}
