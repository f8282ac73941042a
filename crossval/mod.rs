pub mod config;
pub mod data;
pub mod evaluate;
pub mod folds;
pub mod io;
pub mod leakage;
pub mod learner;
pub mod metrics;
pub mod selection;
pub mod synthetic;

pub use config::{ConfigError, CvConfig};
pub use data::{DataError, Dataset};
pub use evaluate::{
    CrossValidator, CvError, DegeneratePolicy, Evaluation, FoldOutcome, FoldStatus,
    RankingProblem, SelectionMode, SelectionScope, evaluate,
};
pub use folds::{FoldAssignment, FoldStrategy, Split};
pub use leakage::evaluate_with_presplit_selection;
pub use learner::{
    FittedModel, Learner, LearnerError, LearnerSpec, LogisticRegression, NearestNeighbors,
    Predictor,
};
pub use selection::{CorrelationScorer, FeatureScorer, rank_by_magnitude};
pub use synthetic::NoiseDatasetBuilder;
