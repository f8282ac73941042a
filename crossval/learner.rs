//! # Classifiers Fitted Inside Each Training Fold
//!
//! The cross-validator is generic over a `Learner`, which turns a block of
//! training rows into a fitted `Predictor`. A fitted model is created fresh for
//! every fold and dropped once that fold is scored.
//!
//! Two learners are provided:
//!
//! 1.  **`LogisticRegression`**: an L2-penalised logistic model with an
//!     unpenalised intercept, fitted by Newton-Raphson (IRLS) with step
//!     halving on the penalised deviance.
//! 2.  **`NearestNeighbors`**: Euclidean k-NN with a majority vote.
//!
//! `LearnerSpec` is the serialisable union of the two, used by configuration
//! files and the command line.

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, Side};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while fitting or applying a learner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LearnerError {
    #[error("Cannot fit a model to an empty training set.")]
    EmptyTrainingSet,

    #[error("Training matrix has {rows} rows but {labels} labels were supplied.")]
    MismatchedLengths { rows: usize, labels: usize },

    #[error("Model was fitted on {expected} features, but the input has {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error(
        "The Newton system became singular at iteration {iteration}. A penalty (l2 > 0) keeps constant columns identifiable."
    )]
    SingularSystem { iteration: usize },

    #[error("Non-finite coefficients encountered at iteration {iteration}.")]
    NonFiniteCoefficients { iteration: usize },

    #[error(
        "The Newton iterations did not converge within {max_iterations} iterations. Last step size was {last_step:.3e}."
    )]
    DidNotConverge {
        max_iterations: usize,
        last_step: f64,
    },

    #[error("Invalid learner parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Custom(String),
}

/// Fits a predictor from training rows and their labels.
pub trait Learner {
    type Model: Predictor;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<Self::Model, LearnerError>;
}

/// Predicts binary labels for new rows.
pub trait Predictor {
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>, LearnerError>;
}

fn check_training_shape(x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<(), LearnerError> {
    if x.nrows() != y.len() {
        return Err(LearnerError::MismatchedLengths {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    if y.is_empty() {
        return Err(LearnerError::EmptyTrainingSet);
    }
    Ok(())
}

fn check_width(expected: usize, x: ArrayView2<f64>) -> Result<(), LearnerError> {
    if x.ncols() != expected {
        return Err(LearnerError::DimensionMismatch {
            expected,
            found: x.ncols(),
        });
    }
    Ok(())
}

// --- Logistic regression ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Ridge penalty on the non-intercept coefficients.
    pub l2: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the largest absolute Newton step.
    pub tolerance: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            l2: 1e-3,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// Intercept followed by one coefficient per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
}

impl LogisticModel {
    pub fn linear_predictor(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, LearnerError> {
        check_width(self.coefficients.len(), x)?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

impl Predictor for LogisticModel {
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>, LearnerError> {
        let eta = self.linear_predictor(x)?;
        Ok(eta.mapv(|v| u8::from(v >= 0.0)))
    }
}

fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

// log(1 + exp(eta)) without overflow.
fn softplus(eta: f64) -> f64 {
    eta.max(0.0) + (-eta.abs()).exp().ln_1p()
}

impl LogisticRegression {
    pub fn validate(&self) -> Result<(), LearnerError> {
        if !(self.l2 >= 0.0 && self.l2.is_finite()) {
            return Err(LearnerError::InvalidParameter(format!(
                "l2 must be finite and non-negative, got {}",
                self.l2
            )));
        }
        if self.max_iterations == 0 {
            return Err(LearnerError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(LearnerError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    fn penalised_deviance(&self, design: &Array2<f64>, y: &Array1<f64>, beta: &Array1<f64>) -> f64 {
        let eta = design.dot(beta);
        let nll: f64 = eta
            .iter()
            .zip(y.iter())
            .map(|(&e, &t)| softplus(e) - t * e)
            .sum();
        let ridge: f64 = beta.iter().skip(1).map(|b| b * b).sum();
        nll + 0.5 * self.l2 * ridge
    }
}

impl Learner for LogisticRegression {
    type Model = LogisticModel;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<LogisticModel, LearnerError> {
        self.validate()?;
        check_training_shape(x, y)?;

        let n = x.nrows();
        let p = x.ncols() + 1;
        let mut design = Array2::<f64>::ones((n, p));
        design.slice_mut(ndarray::s![.., 1..]).assign(&x);
        let y = y.mapv(f64::from);

        let mut beta = Array1::<f64>::zeros(p);
        let mut deviance = self.penalised_deviance(&design, &y, &beta);
        let mut last_step = f64::INFINITY;

        for iteration in 0..self.max_iterations {
            let eta = design.dot(&beta);
            let mu = eta.mapv(sigmoid);
            let weights = mu.mapv(|m| m * (1.0 - m));

            let mut gradient = design.t().dot(&(&mu - &y));
            let weighted = &design * &weights.view().insert_axis(Axis(1));
            let mut hessian = design.t().dot(&weighted);
            for j in 1..p {
                gradient[j] += self.l2 * beta[j];
                hessian[[j, j]] += self.l2;
            }

            let step = solve_newton_system(&hessian, &gradient)
                .map_err(|_| LearnerError::SingularSystem { iteration })?;

            // Step halving keeps each update from increasing the penalised deviance.
            let mut scale = 1.0;
            let mut candidate = &beta - &step;
            let mut candidate_deviance = self.penalised_deviance(&design, &y, &candidate);
            let mut halvings = 0;
            while !(candidate_deviance <= deviance) && halvings < 30 {
                scale *= 0.5;
                candidate = &beta - &(&step * scale);
                candidate_deviance = self.penalised_deviance(&design, &y, &candidate);
                halvings += 1;
            }
            if candidate.iter().any(|b| !b.is_finite()) {
                return Err(LearnerError::NonFiniteCoefficients { iteration });
            }

            last_step = step.iter().fold(0.0_f64, |acc, s| acc.max((s * scale).abs()));
            beta = candidate;
            deviance = candidate_deviance;

            if last_step < self.tolerance {
                log::trace!(
                    "Logistic fit converged after {} iterations (penalised deviance {:.6}).",
                    iteration + 1,
                    deviance
                );
                return Ok(LogisticModel {
                    intercept: beta[0],
                    coefficients: beta.slice(ndarray::s![1..]).to_owned(),
                });
            }
        }

        Err(LearnerError::DidNotConverge {
            max_iterations: self.max_iterations,
            last_step,
        })
    }
}

/// Solves the Newton system `hessian * step = gradient` through a Cholesky
/// factorisation. The penalised Hessian is symmetric positive definite unless
/// the design is rank deficient with `l2 = 0`, which the factorisation reports.
fn solve_newton_system(
    hessian: &Array2<f64>,
    gradient: &Array1<f64>,
) -> Result<Array1<f64>, solvers::LltError> {
    let p = gradient.len();
    let h = Mat::from_fn(p, p, |i, j| hessian[[i, j]]);
    let factor = h.as_ref().llt(Side::Lower)?;
    let rhs = Mat::from_fn(p, 1, |i, _| gradient[i]);
    let sol = factor.solve(rhs.as_ref());
    Ok(Array1::from_shape_fn(p, |i| sol[(i, 0)]))
}

// --- Nearest neighbours ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearestNeighbors {
    pub k: usize,
}

impl Default for NearestNeighbors {
    fn default() -> Self {
        Self { k: 1 }
    }
}

impl NearestNeighbors {
    pub fn validate(&self) -> Result<(), LearnerError> {
        if self.k == 0 {
            return Err(LearnerError::InvalidParameter(
                "k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborModel {
    k: usize,
    x_train: Array2<f64>,
    y_train: Array1<u8>,
}

impl Learner for NearestNeighbors {
    type Model = NeighborModel;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<NeighborModel, LearnerError> {
        self.validate()?;
        check_training_shape(x, y)?;
        Ok(NeighborModel {
            k: self.k.min(y.len()),
            x_train: x.to_owned(),
            y_train: y.to_owned(),
        })
    }
}

impl Predictor for NeighborModel {
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>, LearnerError> {
        check_width(self.x_train.ncols(), x)?;
        let mut predictions = Array1::zeros(x.nrows());
        for (row, sample) in x.axis_iter(Axis(0)).enumerate() {
            let mut distances: Vec<(f64, usize)> = self
                .x_train
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(i, train)| {
                    let d: f64 = sample
                        .iter()
                        .zip(train.iter())
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum();
                    (d, i)
                })
                .collect();
            // Equal distances resolve to the earlier training row.
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let neighbours = &distances[..self.k];
            let ones = neighbours
                .iter()
                .filter(|(_, i)| self.y_train[*i] == 1)
                .count();
            let zeros = self.k - ones;
            predictions[row] = match ones.cmp(&zeros) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => 0,
                std::cmp::Ordering::Equal => self.y_train[neighbours[0].1],
            };
        }
        Ok(predictions)
    }
}

// --- Runtime-selected learner ---

/// A learner chosen from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum LearnerSpec {
    Logistic {
        #[serde(default = "default_l2")]
        l2: f64,
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    NearestNeighbors {
        #[serde(default = "default_k")]
        k: usize,
    },
}

fn default_l2() -> f64 {
    LogisticRegression::default().l2
}

fn default_max_iterations() -> usize {
    LogisticRegression::default().max_iterations
}

fn default_tolerance() -> f64 {
    LogisticRegression::default().tolerance
}

fn default_k() -> usize {
    NearestNeighbors::default().k
}

impl Default for LearnerSpec {
    fn default() -> Self {
        LearnerSpec::from(LogisticRegression::default())
    }
}

impl LearnerSpec {
    /// Parameter checks applied by the selected learner before fitting.
    pub fn validate(&self) -> Result<(), LearnerError> {
        match *self {
            LearnerSpec::Logistic {
                l2,
                max_iterations,
                tolerance,
            } => LogisticRegression {
                l2,
                max_iterations,
                tolerance,
            }
            .validate(),
            LearnerSpec::NearestNeighbors { k } => NearestNeighbors { k }.validate(),
        }
    }
}

impl From<LogisticRegression> for LearnerSpec {
    fn from(l: LogisticRegression) -> Self {
        LearnerSpec::Logistic {
            l2: l.l2,
            max_iterations: l.max_iterations,
            tolerance: l.tolerance,
        }
    }
}

impl From<NearestNeighbors> for LearnerSpec {
    fn from(n: NearestNeighbors) -> Self {
        LearnerSpec::NearestNeighbors { k: n.k }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FittedModel {
    Logistic(LogisticModel),
    NearestNeighbors(NeighborModel),
}

impl Predictor for FittedModel {
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>, LearnerError> {
        match self {
            FittedModel::Logistic(m) => m.predict(x),
            FittedModel::NearestNeighbors(m) => m.predict(x),
        }
    }
}

impl Learner for LearnerSpec {
    type Model = FittedModel;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<FittedModel, LearnerError> {
        match *self {
            LearnerSpec::Logistic {
                l2,
                max_iterations,
                tolerance,
            } => LogisticRegression {
                l2,
                max_iterations,
                tolerance,
            }
            .fit(x, y)
            .map(FittedModel::Logistic),
            LearnerSpec::NearestNeighbors { k } => NearestNeighbors { k }
                .fit(x, y)
                .map(FittedModel::NearestNeighbors),
        }
    }
}
