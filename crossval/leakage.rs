//! # Anti-Pattern: Feature Selection Before the Fold Split
//!
//! `evaluate_with_presplit_selection` ranks features once on the FULL dataset,
//! held-out rows included, and only then cross-validates the classifier on the
//! chosen columns. Every held-out fold has already influenced which columns
//! were picked, so the resulting error is optimistically biased. On pure noise
//! with many more features than samples it reports far better than chance.
//!
//! It exists to demonstrate and regression-test that bias. Use
//! `CrossValidator::evaluate` for an honest estimate.

use crate::crossval::data::Dataset;
use crate::crossval::evaluate::{
    CrossValidator, CvError, Evaluation, SelectionMode, SelectionScope, check_columns,
    score_fold,
};
use crate::crossval::learner::Learner;
use crate::crossval::selection::{FeatureScorer, select_top};

/// Cross-validates `learner` on columns chosen from all rows at once.
///
/// Uses the same seeded folds as `validator.evaluate(..)`, so the two reports
/// differ only in where selection happened.
pub fn evaluate_with_presplit_selection<S, L>(
    validator: &CrossValidator,
    data: &Dataset,
    scorer: &S,
    learner: &L,
) -> Result<Evaluation, CvError>
where
    S: FeatureScorer + ?Sized,
    L: Learner + ?Sized,
{
    let top = validator.effective_top(data)?;
    let assignment = validator.partition(data)?;

    let ranking = scorer.rank(data.features(), data.labels());
    let selected = select_top(&ranking, top);
    check_columns(SelectionScope::FullData, &selected, data.n_features())?;
    log::warn!(
        "Selecting features {:?} on all {} samples before splitting. The error estimate below is biased.",
        selected,
        data.n_samples()
    );

    let mut outcomes = Vec::with_capacity(assignment.n_folds());
    for split in assignment.splits() {
        let train = data.rows(&split.train)?;
        outcomes.push(score_fold(
            data,
            &split,
            train,
            selected.clone(),
            validator.degenerate,
            learner,
        )?);
    }
    Evaluation::from_outcomes(outcomes, assignment, SelectionMode::Presplit)
}
