//! # Fold Partitioning
//!
//! Builds the K-way partition of sample indices that drives cross-validation.
//! The partition is plain index-set data: each group is a sorted `Vec<usize>`,
//! and a fold's training set is the complement of its group, computed by
//! index arithmetic rather than by filtering a shared table.
//!
//! Randomness comes only from an explicit seed, so the same labels, fold count
//! and seed always produce the same partition.

use crate::crossval::evaluate::CvError;
use ndarray::ArrayView1;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How sample indices are dealt into folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStrategy {
    /// Class-proportional folds: for each label, fold sizes differ by at most one.
    #[default]
    Stratified,
    /// Plain shuffled K-fold, ignoring labels.
    Shuffled,
}

/// A validated partition of `0..n_samples` into disjoint, non-empty groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    n_samples: usize,
    groups: Vec<Vec<usize>>,
}

/// One train/test split derived from a `FoldAssignment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub fold: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl FoldAssignment {
    /// Builds a seeded partition of the samples behind `labels`.
    pub fn build(
        labels: ArrayView1<u8>,
        folds: usize,
        strategy: FoldStrategy,
        seed: u64,
    ) -> Result<Self, CvError> {
        let n_samples = labels.len();
        check_fold_count(folds, n_samples)?;
        if let Some((index, &label)) = labels.iter().enumerate().find(|(_, l)| **l > 1) {
            return Err(CvError::NonBinaryLabel { index, label });
        }
        let mut rng = StdRng::seed_from_u64(seed);

        let groups = match strategy {
            FoldStrategy::Stratified => {
                let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
                for (index, &label) in labels.iter().enumerate() {
                    by_class[usize::from(label)].push(index);
                }
                for (label, members) in by_class.iter().enumerate() {
                    if members.len() < folds {
                        return Err(CvError::StratificationInfeasible {
                            label: label as u8,
                            count: members.len(),
                            folds,
                        });
                    }
                }
                let mut groups = vec![Vec::new(); folds];
                let mut offset = 0;
                for members in by_class.iter_mut() {
                    members.shuffle(&mut rng);
                    deal(members, offset, &mut groups);
                    offset += members.len();
                }
                groups
            }
            FoldStrategy::Shuffled => {
                let mut order: Vec<usize> = (0..n_samples).collect();
                order.shuffle(&mut rng);
                let mut groups = vec![Vec::new(); folds];
                deal(&order, 0, &mut groups);
                groups
            }
        };

        Self::from_groups(n_samples, groups)
    }

    /// Accepts a caller-supplied partition after checking it covers every
    /// index exactly once with no empty group.
    pub fn from_groups(n_samples: usize, mut groups: Vec<Vec<usize>>) -> Result<Self, CvError> {
        check_fold_count(groups.len(), n_samples)?;
        let mut seen = vec![false; n_samples];
        for (fold, group) in groups.iter_mut().enumerate() {
            if group.is_empty() {
                return Err(CvError::InvalidPartition(format!("fold {fold} is empty")));
            }
            for &index in group.iter() {
                if index >= n_samples {
                    return Err(CvError::InvalidPartition(format!(
                        "fold {fold} contains index {index}, but there are only {n_samples} samples"
                    )));
                }
                if seen[index] {
                    return Err(CvError::InvalidPartition(format!(
                        "index {index} appears in more than one fold"
                    )));
                }
                seen[index] = true;
            }
            group.sort_unstable();
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(CvError::InvalidPartition(format!(
                "index {missing} is not assigned to any fold"
            )));
        }
        Ok(Self { n_samples, groups })
    }

    pub fn n_folds(&self) -> usize {
        self.groups.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Held-out indices of each fold, sorted ascending.
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// The train/test split for one fold. Training indices are the sorted
    /// complement of the held-out group.
    pub fn split(&self, fold: usize) -> Option<Split> {
        let test = self.groups.get(fold)?.clone();
        let mut held_out = vec![false; self.n_samples];
        for &index in &test {
            held_out[index] = true;
        }
        let train = (0..self.n_samples).filter(|&i| !held_out[i]).collect();
        Some(Split { fold, train, test })
    }

    pub fn splits(&self) -> impl Iterator<Item = Split> + '_ {
        (0..self.n_folds()).filter_map(move |fold| self.split(fold))
    }
}

fn check_fold_count(folds: usize, n_samples: usize) -> Result<(), CvError> {
    if folds < 2 || folds > n_samples {
        return Err(CvError::InvalidFoldCount {
            folds,
            samples: n_samples,
        });
    }
    Ok(())
}

// Round-robin, starting where the previous class stopped so totals stay balanced.
fn deal(indices: &[usize], offset: usize, groups: &mut [Vec<usize>]) {
    let k = groups.len();
    for (position, &index) in indices.iter().enumerate() {
        groups[(offset + position) % k].push(index);
    }
}
