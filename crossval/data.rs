//! # Dataset Container and Index-Set Slicing
//!
//! The validator never filters a shared table in place. A `Dataset` owns an
//! index-aligned feature matrix and label vector, and every train or test slice
//! is an owned copy keyed by an explicit list of row indices.
//!
//! - Shape: `features` is `[n_samples, n_features]`, `labels` is `[n_samples]`.
//! - Labels: strictly binary, stored as `0` or `1`.
//! - Values: every feature must be finite.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

/// Failures raised while building or loading a dataset.
#[derive(Error, Debug)]
pub enum DataError {
    #[error(
        "Feature matrix has {rows} rows but the label vector has {labels} entries. They must be index-aligned."
    )]
    MismatchedLengths { rows: usize, labels: usize },

    #[error("The dataset contains no samples.")]
    Empty,

    #[error("The dataset contains no feature columns.")]
    NoFeatures,

    #[error("Label at row {row} is {value}, but only binary labels (0 or 1) are supported.")]
    NonBinaryLabel { row: usize, value: String },

    #[error("Non-finite feature value (NaN or Infinity) at row {row}, column {column}.")]
    NonFiniteFeature { row: usize, column: usize },

    #[error("Row index {index} is out of range for a dataset with {n_samples} samples.")]
    RowOutOfRange { index: usize, n_samples: usize },

    #[error("Column index {index} is out of range for a dataset with {n_features} features.")]
    ColumnOutOfRange { index: usize, n_features: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error reading delimited input: {0}")]
    CsvError(#[from] csv::Error),

    #[error("The required column '{0}' was not found in the input header.")]
    ColumnNotFound(String),

    #[error("Row {row} has {found} fields, but the header declares {expected}.")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Value '{value}' in column '{column}' (row {row}) is not numeric.")]
    NonNumericValue {
        row: usize,
        column: String,
        value: String,
    },
}

/// A validated, index-aligned labeled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Array1<u8>,
}

impl Dataset {
    /// Builds a dataset, checking alignment, label domain and finiteness.
    pub fn new(features: Array2<f64>, labels: Array1<u8>) -> Result<Self, DataError> {
        if features.nrows() != labels.len() {
            return Err(DataError::MismatchedLengths {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }
        if labels.is_empty() {
            return Err(DataError::Empty);
        }
        if features.ncols() == 0 {
            return Err(DataError::NoFeatures);
        }
        if let Some((row, &value)) = labels.iter().enumerate().find(|(_, l)| **l > 1) {
            return Err(DataError::NonBinaryLabel {
                row,
                value: value.to_string(),
            });
        }
        for ((row, column), value) in features.indexed_iter() {
            if !value.is_finite() {
                return Err(DataError::NonFiniteFeature { row, column });
            }
        }
        Ok(Self { features, labels })
    }

    /// Convenience constructor for labels held as floating point 0.0 / 1.0.
    pub fn from_float_labels(
        features: Array2<f64>,
        labels: ArrayView1<f64>,
    ) -> Result<Self, DataError> {
        let mut converted = Array1::zeros(labels.len());
        for (row, &value) in labels.iter().enumerate() {
            converted[row] = if value == 0.0 {
                0
            } else if value == 1.0 {
                1
            } else {
                return Err(DataError::NonBinaryLabel {
                    row,
                    value: value.to_string(),
                });
            };
        }
        Self::new(features, converted)
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> ArrayView1<'_, u8> {
        self.labels.view()
    }

    /// Number of samples carrying each label, indexed by label value.
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for &label in self.labels.iter() {
            counts[label as usize] += 1;
        }
        counts
    }

    /// Owned copy of the given rows, in the order supplied.
    pub fn rows(&self, indices: &[usize]) -> Result<Dataset, DataError> {
        self.check_rows(indices)?;
        Ok(Dataset {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        })
    }

    /// Owned copy of the given feature columns; labels are kept unchanged.
    pub fn columns(&self, indices: &[usize]) -> Result<Dataset, DataError> {
        if let Some(&index) = indices.iter().find(|&&c| c >= self.n_features()) {
            return Err(DataError::ColumnOutOfRange {
                index,
                n_features: self.n_features(),
            });
        }
        Ok(Dataset {
            features: self.features.select(Axis(1), indices),
            labels: self.labels.clone(),
        })
    }

    /// Returns `Some(label)` when every sample carries the same label.
    pub fn single_class(&self) -> Option<u8> {
        let first = *self.labels.first()?;
        self.labels.iter().all(|&l| l == first).then_some(first)
    }

    pub fn into_parts(self) -> (Array2<f64>, Array1<u8>) {
        (self.features, self.labels)
    }

    fn check_rows(&self, indices: &[usize]) -> Result<(), DataError> {
        match indices.iter().find(|&&r| r >= self.n_samples()) {
            Some(&index) => Err(DataError::RowOutOfRange {
                index,
                n_samples: self.n_samples(),
            }),
            None => Ok(()),
        }
    }
}
