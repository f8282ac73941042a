//! # Feature Scoring and Top-M Selection
//!
//! A scorer maps a block of training rows and their labels to one score per
//! feature column. Ranking is by score magnitude, descending, with ties broken
//! by ascending column index. NaN scores always rank last. The tie-break is
//! explicit so that selection never depends on incidental sort behaviour.
//!
//! Scorers only ever see the rows they are handed. During cross-validation
//! those are the training rows of a single fold.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

/// Ranks feature columns by their association with a binary label.
pub trait FeatureScorer {
    /// One score per column of `x`. Larger magnitude means stronger association.
    fn scores(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Array1<f64>;

    /// Column indices ordered from strongest to weakest association.
    fn rank(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Vec<usize> {
        rank_by_magnitude(self.scores(x, y).view())
    }
}

impl<F> FeatureScorer for F
where
    F: Fn(ArrayView2<f64>, ArrayView1<u8>) -> Array1<f64>,
{
    fn scores(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Array1<f64> {
        self(x, y)
    }
}

/// Absolute Pearson correlation between each column and the label.
///
/// A constant column, or a constant label vector, scores 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationScorer;

impl FeatureScorer for CorrelationScorer {
    fn scores(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Array1<f64> {
        let n = y.len();
        if n == 0 {
            return Array1::zeros(x.ncols());
        }
        let y = y.mapv(f64::from);
        let y_mean = y.sum() / n as f64;
        let y_centered = y.mapv(|v| v - y_mean);
        let syy = y_centered.dot(&y_centered);
        if syy <= 0.0 {
            return Array1::zeros(x.ncols());
        }

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let mut scores = Array1::zeros(x.ncols());
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let mean = means[j];
            let mut sxy = 0.0;
            let mut sxx = 0.0;
            for (value, yc) in column.iter().zip(y_centered.iter()) {
                let xc = value - mean;
                sxy += xc * yc;
                sxx += xc * xc;
            }
            scores[j] = if sxx > 0.0 {
                (sxy / (sxx * syy).sqrt()).abs()
            } else {
                0.0
            };
        }
        scores
    }
}

/// Sorts column indices by `|score|` descending, then by index ascending.
pub fn rank_by_magnitude(scores: ArrayView1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| compare_scores(scores[a], scores[b]).then(a.cmp(&b)));
    order
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // Descending by magnitude.
        (false, false) => b.abs().total_cmp(&a.abs()),
    }
}

/// The first `top` entries of a ranking, clamped to the number of features.
pub fn select_top(ranking: &[usize], top: usize) -> Vec<usize> {
    let m = top.min(ranking.len());
    if m < top {
        log::debug!(
            "Requested {} top features but only {} are available; selecting {}.",
            top,
            ranking.len(),
            m
        );
    }
    ranking[..m].to_vec()
}
