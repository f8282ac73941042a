//! Error measures for held-out predictions.

use ndarray::ArrayView1;

/// Fraction of positions where the predicted label differs from the truth.
///
/// For 0/1 labels this equals the mean squared error. Returns `None` for empty
/// or mismatched inputs.
pub fn misclassification_rate(truth: ArrayView1<u8>, predicted: ArrayView1<u8>) -> Option<f64> {
    if truth.is_empty() || truth.len() != predicted.len() {
        return None;
    }
    let wrong = truth
        .iter()
        .zip(predicted.iter())
        .filter(|(t, p)| t != p)
        .count();
    Some(wrong as f64 / truth.len() as f64)
}

/// Mean of squared differences between two equally long vectors.
pub fn mean_squared_error(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Option<f64> {
    if truth.is_empty() || truth.len() != predicted.len() {
        return None;
    }
    let sum: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    Some(sum / truth.len() as f64)
}

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
