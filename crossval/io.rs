//! Tab-separated dataset input.
//!
//! The header must contain a `label` column holding 0 or 1. Every other column
//! is read as a numeric feature, in file order.

use crate::crossval::data::{DataError, Dataset};
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const LABEL_COLUMN: &str = "label";

/// A dataset together with the names of its feature columns.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub feature_names: Vec<String>,
}

pub fn load_tsv(path: &Path) -> Result<LoadedDataset, DataError> {
    let file = File::open(path)?;
    let loaded = read_tsv(file)?;
    log::info!(
        "Loaded {} samples with {} features from {}.",
        loaded.dataset.n_samples(),
        loaded.dataset.n_features(),
        path.display()
    );
    Ok(loaded)
}

pub fn read_tsv<R: Read>(reader: R) -> Result<LoadedDataset, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let label_index = headers
        .iter()
        .position(|h| h == LABEL_COLUMN)
        .ok_or_else(|| DataError::ColumnNotFound(LABEL_COLUMN.to_string()))?;
    let feature_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != label_index)
        .map(|(_, h)| h.clone())
        .collect();

    let mut labels = Vec::new();
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(DataError::RaggedRow {
                row,
                found: record.len(),
                expected: headers.len(),
            });
        }
        for (column, field) in record.iter().enumerate() {
            let value: f64 = field.parse().map_err(|_| DataError::NonNumericValue {
                row,
                column: headers[column].clone(),
                value: field.to_string(),
            })?;
            if column == label_index {
                labels.push(value);
            } else {
                values.push(value);
            }
        }
    }

    let n_samples = labels.len();
    let features = Array2::from_shape_vec((n_samples, feature_names.len()), values)
        .map_err(|_| DataError::MismatchedLengths {
            rows: n_samples,
            labels: n_samples,
        })?;
    let dataset = Dataset::from_float_labels(features, Array1::from(labels).view())?;
    Ok(LoadedDataset {
        dataset,
        feature_names,
    })
}
