//! # Leak-Free Cross-Validation
//!
//! Estimates the out-of-fold error of a "select the top-M features, then fit a
//! classifier" pipeline. For each fold:
//!
//! 1.  The training rows are copied out by index. Nothing else is visible yet.
//! 2.  Features are ranked by the scorer on those rows alone, and the top M
//!     columns are kept.
//! 3.  The learner is fitted on the training rows restricted to those columns.
//! 4.  Only then are the held-out rows copied out, restricted to the same
//!     columns, predicted and scored.
//!
//! No step before scoring ever receives a held-out row, so selection can not
//! absorb information from the data it is evaluated on. The leaky ordering
//! (select on everything, then split) lives in `leakage` under a name that says
//! what it does.

use crate::crossval::config::CvConfig;
use crate::crossval::data::{DataError, Dataset};
use crate::crossval::folds::{FoldAssignment, FoldStrategy, Split};
use crate::crossval::learner::{Learner, LearnerError, Predictor};
use crate::crossval::metrics::{mean, misclassification_rate};
use crate::crossval::selection::{FeatureScorer, select_top};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvError {
    #[error("Fold count {folds} is invalid for {samples} samples. It must satisfy 2 <= K <= N.")]
    InvalidFoldCount { folds: usize, samples: usize },

    #[error(
        "Stratified folds are infeasible: label {label} has {count} samples, fewer than the {folds} folds requested."
    )]
    StratificationInfeasible { label: u8, count: usize, folds: usize },

    #[error("Invalid fold partition: {0}")]
    InvalidPartition(String),

    #[error("At least one top feature must be selected.")]
    InvalidFeatureCount,

    #[error("Fold {fold}: every training label is {label}, so a classifier cannot be fitted.")]
    DegenerateTrainingFold { fold: usize, label: u8 },

    #[error("Every fold had a degenerate training set; no error estimate can be formed.")]
    NoScoredFolds,

    #[error("{scope}: the feature scorer selected column {index}, which is {problem}.")]
    InvalidRanking {
        scope: SelectionScope,
        index: usize,
        problem: RankingProblem,
    },

    #[error("Label {label} at sample {index} is not binary; fold assignment expects 0 or 1.")]
    NonBinaryLabel { index: usize, label: u8 },

    #[error("Fold {fold}: fitting failed: {source}")]
    FitFailure {
        fold: usize,
        #[source]
        source: LearnerError,
    },

    #[error("Fold {fold}: prediction failed: {source}")]
    PredictFailure {
        fold: usize,
        #[source]
        source: LearnerError,
    },

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

/// The rows a feature ranking was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionScope {
    /// The training rows of one fold.
    Fold(usize),
    /// Every row, before any split.
    FullData,
}

impl fmt::Display for SelectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionScope::Fold(fold) => write!(f, "Fold {fold}"),
            SelectionScope::FullData => write!(f, "Full-data selection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingProblem {
    OutOfRange { n_features: usize },
    Repeated,
}

impl fmt::Display for RankingProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingProblem::OutOfRange { n_features } => {
                write!(f, "out of range for {n_features} features")
            }
            RankingProblem::Repeated => write!(f, "already selected"),
        }
    }
}

/// What to do with a fold whose training labels are all one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Skip fitting, mark the fold, and leave it out of the mean.
    #[default]
    Flag,
    /// Fail the whole evaluation with `CvError::DegenerateTrainingFold`.
    Abort,
}

/// Where feature selection happened relative to the fold split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    WithinFold,
    /// Selection computed once on the full dataset. Optimistically biased.
    Presplit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FoldStatus {
    Scored { error: f64 },
    Degenerate { label: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldOutcome {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    /// Column indices used by this fold's model, strongest first.
    pub selected_features: Vec<usize>,
    pub status: FoldStatus,
}

impl FoldOutcome {
    pub fn error(&self) -> Option<f64> {
        match self.status {
            FoldStatus::Scored { error } => Some(error),
            FoldStatus::Degenerate { .. } => None,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self.status, FoldStatus::Degenerate { .. })
    }
}

/// Per-fold outcomes and their aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    folds: Vec<FoldOutcome>,
    mean_error: f64,
    assignment: FoldAssignment,
    selection: SelectionMode,
}

impl Evaluation {
    pub(crate) fn from_outcomes(
        folds: Vec<FoldOutcome>,
        assignment: FoldAssignment,
        selection: SelectionMode,
    ) -> Result<Self, CvError> {
        let scored: Vec<f64> = folds.iter().filter_map(FoldOutcome::error).collect();
        let mean_error = mean(&scored).ok_or(CvError::NoScoredFolds)?;
        Ok(Self {
            folds,
            mean_error,
            assignment,
            selection,
        })
    }

    pub fn folds(&self) -> &[FoldOutcome] {
        &self.folds
    }

    /// One entry per fold, in fold order; `None` marks a degenerate fold.
    pub fn fold_errors(&self) -> Vec<Option<f64>> {
        self.folds.iter().map(FoldOutcome::error).collect()
    }

    pub fn scored_errors(&self) -> Vec<f64> {
        self.folds.iter().filter_map(FoldOutcome::error).collect()
    }

    /// Arithmetic mean of the scored fold errors.
    pub fn mean_error(&self) -> f64 {
        self.mean_error
    }

    pub fn degenerate_folds(&self) -> Vec<usize> {
        self.folds
            .iter()
            .filter(|f| f.is_degenerate())
            .map(|f| f.fold)
            .collect()
    }

    pub fn assignment(&self) -> &FoldAssignment {
        &self.assignment
    }

    pub fn selection(&self) -> SelectionMode {
        self.selection
    }
}

/// Runs the leak-free procedure with fixed settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossValidator {
    pub folds: usize,
    pub top_features: usize,
    pub seed: u64,
    pub strategy: FoldStrategy,
    pub degenerate: DegeneratePolicy,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new(&CvConfig::default())
    }
}

impl CrossValidator {
    pub fn new(config: &CvConfig) -> Self {
        Self {
            folds: config.folds,
            top_features: config.top_features,
            seed: config.seed,
            strategy: config.strategy,
            degenerate: config.degenerate,
        }
    }

    /// The seeded fold assignment this validator would use for `data`.
    pub fn partition(&self, data: &Dataset) -> Result<FoldAssignment, CvError> {
        FoldAssignment::build(data.labels(), self.folds, self.strategy, self.seed)
    }

    /// Number of features actually kept per fold: `min(M, F)`.
    pub fn effective_top(&self, data: &Dataset) -> Result<usize, CvError> {
        if self.top_features == 0 {
            return Err(CvError::InvalidFeatureCount);
        }
        let m = self.top_features.min(data.n_features());
        if m < self.top_features {
            log::debug!(
                "Reducing top features from {} to the {} available.",
                self.top_features,
                m
            );
        }
        Ok(m)
    }

    pub fn evaluate<S, L>(
        &self,
        data: &Dataset,
        scorer: &S,
        learner: &L,
    ) -> Result<Evaluation, CvError>
    where
        S: FeatureScorer + ?Sized,
        L: Learner + ?Sized,
    {
        let top = self.effective_top(data)?;
        let assignment = self.partition(data)?;
        self.run(data, assignment, top, scorer, learner)
    }

    /// Same as `evaluate`, with a caller-supplied partition instead of a seeded one.
    pub fn evaluate_with_assignment<S, L>(
        &self,
        data: &Dataset,
        assignment: FoldAssignment,
        scorer: &S,
        learner: &L,
    ) -> Result<Evaluation, CvError>
    where
        S: FeatureScorer + ?Sized,
        L: Learner + ?Sized,
    {
        if assignment.n_samples() != data.n_samples() {
            return Err(CvError::InvalidPartition(format!(
                "partition covers {} samples but the dataset has {}",
                assignment.n_samples(),
                data.n_samples()
            )));
        }
        let top = self.effective_top(data)?;
        self.run(data, assignment, top, scorer, learner)
    }

    /// Top-ranked columns computed from the training rows of `split` only.
    pub fn select_features<S>(
        &self,
        data: &Dataset,
        split: &Split,
        scorer: &S,
    ) -> Result<Vec<usize>, CvError>
    where
        S: FeatureScorer + ?Sized,
    {
        let top = self.effective_top(data)?;
        let train = data.rows(&split.train)?;
        select_within(&train, split.fold, top, scorer)
    }

    fn run<S, L>(
        &self,
        data: &Dataset,
        assignment: FoldAssignment,
        top: usize,
        scorer: &S,
        learner: &L,
    ) -> Result<Evaluation, CvError>
    where
        S: FeatureScorer + ?Sized,
        L: Learner + ?Sized,
    {
        log::info!(
            "Starting {}-fold cross-validation: {} samples, {} features, top {} selected within each fold.",
            assignment.n_folds(),
            data.n_samples(),
            data.n_features(),
            top
        );

        let mut outcomes = Vec::with_capacity(assignment.n_folds());
        for split in assignment.splits() {
            let train = data.rows(&split.train)?;
            let selected = select_within(&train, split.fold, top, scorer)?;
            let outcome = score_fold(data, &split, train, selected, self.degenerate, learner)?;
            outcomes.push(outcome);
        }

        let evaluation = Evaluation::from_outcomes(outcomes, assignment, SelectionMode::WithinFold)?;
        log::info!(
            "Cross-validation finished: mean error {:.4} over {} scored folds ({} degenerate).",
            evaluation.mean_error(),
            evaluation.scored_errors().len(),
            evaluation.degenerate_folds().len()
        );
        Ok(evaluation)
    }
}

fn select_within<S>(
    train: &Dataset,
    fold: usize,
    top: usize,
    scorer: &S,
) -> Result<Vec<usize>, CvError>
where
    S: FeatureScorer + ?Sized,
{
    let ranking = scorer.rank(train.features(), train.labels());
    let selected = select_top(&ranking, top);
    check_columns(SelectionScope::Fold(fold), &selected, train.n_features())?;
    Ok(selected)
}

/// Rejects selected columns that are out of range or listed twice.
pub(crate) fn check_columns(
    scope: SelectionScope,
    selected: &[usize],
    n_features: usize,
) -> Result<(), CvError> {
    let mut seen = vec![false; n_features];
    for &index in selected {
        let problem = if index >= n_features {
            RankingProblem::OutOfRange { n_features }
        } else if seen[index] {
            RankingProblem::Repeated
        } else {
            seen[index] = true;
            continue;
        };
        return Err(CvError::InvalidRanking {
            scope,
            index,
            problem,
        });
    }
    Ok(())
}

/// Fits on `train` restricted to `selected`, then predicts and scores the
/// held-out rows of `split`. The held-out rows are not read before fitting.
pub(crate) fn score_fold<L>(
    data: &Dataset,
    split: &Split,
    train: Dataset,
    selected: Vec<usize>,
    policy: DegeneratePolicy,
    learner: &L,
) -> Result<FoldOutcome, CvError>
where
    L: Learner + ?Sized,
    L::Model: Predictor,
{
    let fold = split.fold;
    let train_size = train.n_samples();
    let test_size = split.test.len();

    if let Some(label) = train.single_class() {
        return match policy {
            DegeneratePolicy::Abort => Err(CvError::DegenerateTrainingFold { fold, label }),
            DegeneratePolicy::Flag => {
                log::warn!(
                    "Fold {}: all {} training labels are {}; fold flagged and left out of the mean.",
                    fold,
                    train_size,
                    label
                );
                Ok(FoldOutcome {
                    fold,
                    train_size,
                    test_size,
                    selected_features: selected,
                    status: FoldStatus::Degenerate { label },
                })
            }
        };
    }

    let (train_x, train_y) = restrict(train, &selected);
    let model = learner
        .fit(train_x.view(), train_y.view())
        .map_err(|source| CvError::FitFailure { fold, source })?;

    let (test_x, test_y) = restrict(data.rows(&split.test)?, &selected);
    let predicted = model
        .predict(test_x.view())
        .map_err(|source| CvError::PredictFailure { fold, source })?;
    let error = misclassification_rate(test_y.view(), predicted.view()).ok_or_else(|| {
        CvError::PredictFailure {
            fold,
            source: LearnerError::Custom(format!(
                "expected {} predictions, got {}",
                test_y.len(),
                predicted.len()
            )),
        }
    })?;

    log::debug!(
        "Fold {}: {} train / {} test rows, features {:?}, error {:.4}.",
        fold,
        train_size,
        test_size,
        selected,
        error
    );

    Ok(FoldOutcome {
        fold,
        train_size,
        test_size,
        selected_features: selected,
        status: FoldStatus::Scored { error },
    })
}

fn restrict(rows: Dataset, columns: &[usize]) -> (Array2<f64>, Array1<u8>) {
    let (features, labels) = rows.into_parts();
    (features.select(Axis(1), columns), labels)
}

/// One-call form: stratified folds with the given seed, degenerate folds abort.
/// Returns the per-fold errors and their mean.
pub fn evaluate<S, L>(
    data: &Dataset,
    folds: usize,
    top_features: usize,
    seed: u64,
    scorer: &S,
    learner: &L,
) -> Result<(Vec<f64>, f64), CvError>
where
    S: FeatureScorer + ?Sized,
    L: Learner + ?Sized,
{
    let validator = CrossValidator {
        folds,
        top_features,
        seed,
        strategy: FoldStrategy::Stratified,
        degenerate: DegeneratePolicy::Abort,
    };
    let evaluation = validator.evaluate(data, scorer, learner)?;
    Ok((evaluation.scored_errors(), evaluation.mean_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossval::learner::{LogisticRegression, NearestNeighbors};
    use crate::crossval::selection::CorrelationScorer;
    use approx::assert_abs_diff_eq;
    use ndarray::{ArrayView1, ArrayView2, array};

    /// Column 0 carries the label exactly; columns 1 and 2 are noise.
    fn signal_dataset() -> Dataset {
        let labels = array![0u8, 1, 0, 1, 0, 1, 0, 1, 0, 1, 1, 0];
        let noise_a = [0.3, 0.1, 0.9, 0.4, 0.2, 0.8, 0.5, 0.6, 0.7, 0.0, 0.35, 0.65];
        let noise_b = [1.0, 3.0, 2.0, 5.0, 4.0, 0.0, 2.5, 1.5, 3.5, 4.5, 0.5, 5.5];
        let features = Array2::from_shape_fn((12, 3), |(i, j)| match j {
            0 => f64::from(labels[i]),
            1 => noise_a[i],
            _ => noise_b[i],
        });
        Dataset::new(features, labels).unwrap()
    }

    fn validator(folds: usize) -> CrossValidator {
        CrossValidator {
            folds,
            top_features: 1,
            seed: 3,
            strategy: FoldStrategy::Stratified,
            degenerate: DegeneratePolicy::Flag,
        }
    }

    #[test]
    fn informative_feature_is_selected_and_scores_perfectly() {
        let data = signal_dataset();
        let eval = validator(3)
            .evaluate(&data, &CorrelationScorer, &LogisticRegression::default())
            .unwrap();
        assert_eq!(eval.folds().len(), 3);
        for fold in eval.folds() {
            assert_eq!(fold.selected_features, vec![0]);
            assert_eq!(fold.train_size + fold.test_size, 12);
        }
        assert_abs_diff_eq!(eval.mean_error(), 0.0, epsilon = 1e-12);
        assert_eq!(eval.selection(), SelectionMode::WithinFold);
    }

    #[test]
    fn mean_matches_fold_errors() {
        let data = signal_dataset();
        let v = CrossValidator {
            top_features: 3,
            ..validator(4)
        };
        let eval = v
            .evaluate(&data, &CorrelationScorer, &NearestNeighbors { k: 3 })
            .unwrap();
        let errors = eval.scored_errors();
        assert_eq!(errors.len(), 4);
        let manual = errors.iter().sum::<f64>() / errors.len() as f64;
        assert_abs_diff_eq!(eval.mean_error(), manual, epsilon = 1e-12);
    }

    #[test]
    fn top_features_are_clamped_to_available_columns() {
        let data = signal_dataset();
        let v = CrossValidator {
            top_features: 10,
            ..validator(3)
        };
        let eval = v
            .evaluate(&data, &CorrelationScorer, &LogisticRegression::default())
            .unwrap();
        for fold in eval.folds() {
            assert_eq!(fold.selected_features.len(), 3);
            assert_eq!(fold.selected_features[0], 0);
        }
    }

    #[test]
    fn zero_top_features_is_rejected() {
        let data = signal_dataset();
        let v = CrossValidator {
            top_features: 0,
            ..validator(3)
        };
        let err = v
            .evaluate(&data, &CorrelationScorer, &LogisticRegression::default())
            .unwrap_err();
        assert!(matches!(err, CvError::InvalidFeatureCount));
    }

    fn degenerate_assignment() -> FoldAssignment {
        // Fold 0 holds out every positive, so its training labels are all 0.
        FoldAssignment::from_groups(
            12,
            vec![vec![1, 3, 5, 7, 9, 10], vec![0, 2, 4], vec![6, 8, 11]],
        )
        .unwrap()
    }

    #[test]
    fn degenerate_fold_is_flagged() {
        let data = signal_dataset();
        let eval = validator(3)
            .evaluate_with_assignment(
                &data,
                degenerate_assignment(),
                &CorrelationScorer,
                &LogisticRegression::default(),
            )
            .unwrap();
        assert_eq!(eval.degenerate_folds(), vec![0]);
        assert_eq!(eval.folds()[0].status, FoldStatus::Degenerate { label: 0 });
        let errors = eval.fold_errors();
        assert_eq!(errors[0], None);
        assert!(errors[1].is_some() && errors[2].is_some());
        assert_eq!(eval.scored_errors().len(), 2);
    }

    #[test]
    fn degenerate_fold_aborts_under_abort_policy() {
        let data = signal_dataset();
        let v = CrossValidator {
            degenerate: DegeneratePolicy::Abort,
            ..validator(3)
        };
        let err = v
            .evaluate_with_assignment(
                &data,
                degenerate_assignment(),
                &CorrelationScorer,
                &LogisticRegression::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CvError::DegenerateTrainingFold { fold: 0, label: 0 }
        ));
    }

    #[test]
    fn partition_size_must_match_dataset() {
        let data = signal_dataset();
        let assignment = FoldAssignment::from_groups(4, vec![vec![0, 1], vec![2, 3]]).unwrap();
        let err = validator(2)
            .evaluate_with_assignment(&data, assignment, &CorrelationScorer, &NearestNeighbors::default())
            .unwrap_err();
        assert!(matches!(err, CvError::InvalidPartition(_)));
    }

    struct FailingLearner;

    impl Learner for FailingLearner {
        type Model = crate::crossval::learner::LogisticModel;

        fn fit(
            &self,
            _x: ArrayView2<f64>,
            _y: ArrayView1<u8>,
        ) -> Result<Self::Model, LearnerError> {
            Err(LearnerError::Custom("refused".to_string()))
        }
    }

    #[test]
    fn fit_failure_carries_fold_index() {
        let data = signal_dataset();
        let err = validator(3)
            .evaluate(&data, &CorrelationScorer, &FailingLearner)
            .unwrap_err();
        match err {
            CvError::FitFailure { fold, source } => {
                assert_eq!(fold, 0);
                assert_eq!(source, LearnerError::Custom("refused".to_string()));
            }
            other => panic!("Expected FitFailure, got {:?}", other),
        }
    }

    struct ShortPredictor;

    impl Predictor for ShortPredictor {
        fn predict(&self, _x: ArrayView2<f64>) -> Result<Array1<u8>, LearnerError> {
            Ok(array![0u8])
        }
    }

    struct ShortLearner;

    impl Learner for ShortLearner {
        type Model = ShortPredictor;

        fn fit(
            &self,
            _x: ArrayView2<f64>,
            _y: ArrayView1<u8>,
        ) -> Result<ShortPredictor, LearnerError> {
            Ok(ShortPredictor)
        }
    }

    #[test]
    fn wrong_prediction_length_is_a_predict_failure() {
        let data = signal_dataset();
        let err = validator(3)
            .evaluate(&data, &CorrelationScorer, &ShortLearner)
            .unwrap_err();
        assert!(matches!(err, CvError::PredictFailure { fold: 0, .. }));
    }

    // Scores columns that do not exist above the real ones.
    fn out_of_range_ranking(x: ArrayView2<f64>, _y: ArrayView1<u8>) -> Array1<f64> {
        Array1::from_shape_fn(x.ncols() + 5, |j| j as f64)
    }

    #[test]
    fn scorer_returning_unknown_columns_is_reported() {
        let data = signal_dataset();
        let err = validator(3)
            .evaluate(&data, &out_of_range_ranking, &LogisticRegression::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CvError::InvalidRanking {
                scope: SelectionScope::Fold(0),
                index: 7,
                problem: RankingProblem::OutOfRange { n_features: 3 }
            }
        ));
    }

    /// Ranks column 0 twice, as a careless custom ranking might.
    struct RepeatingRanker;

    impl FeatureScorer for RepeatingRanker {
        fn scores(&self, x: ArrayView2<f64>, _y: ArrayView1<u8>) -> Array1<f64> {
            Array1::zeros(x.ncols())
        }

        fn rank(&self, x: ArrayView2<f64>, _y: ArrayView1<u8>) -> Vec<usize> {
            let mut ranking = vec![0];
            ranking.extend(0..x.ncols());
            ranking
        }
    }

    #[test]
    fn repeated_columns_in_a_ranking_are_rejected() {
        let data = signal_dataset();
        let err = CrossValidator {
            top_features: 2,
            ..validator(3)
        }
        .evaluate(&data, &RepeatingRanker, &LogisticRegression::default())
        .unwrap_err();
        assert!(matches!(
            err,
            CvError::InvalidRanking {
                scope: SelectionScope::Fold(0),
                index: 0,
                problem: RankingProblem::Repeated
            }
        ));
        assert!(err.to_string().starts_with("Fold 0: "), "{err}");
    }

    #[test]
    fn one_call_form_returns_errors_and_mean() {
        let data = signal_dataset();
        let (errors, mean_error) = evaluate(
            &data,
            2,
            1,
            11,
            &CorrelationScorer,
            &LogisticRegression::default(),
        )
        .unwrap();
        assert_eq!(errors.len(), 2);
        assert_abs_diff_eq!(mean_error, 0.0, epsilon = 1e-12);
    }
}
