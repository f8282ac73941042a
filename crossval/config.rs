//! Run configuration for a cross-validation, stored as TOML.
//!
//! ```toml
//! folds = 5
//! top_features = 2
//! seed = 42
//! strategy = "stratified"   # or "shuffled"
//! degenerate = "flag"       # or "abort"
//!
//! [learner]
//! kind = "logistic"
//! l2 = 0.001
//! ```

use crate::crossval::evaluate::DegeneratePolicy;
use crate::crossval::folds::FoldStrategy;
use crate::crossval::learner::LearnerSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CvConfig {
    /// Number of folds, K.
    pub folds: usize,
    /// Number of top-ranked features kept in each training fold, M.
    pub top_features: usize,
    /// Seed for the fold assignment.
    pub seed: u64,
    pub strategy: FoldStrategy,
    pub degenerate: DegeneratePolicy,
    pub learner: LearnerSpec,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            top_features: 2,
            seed: 0,
            strategy: FoldStrategy::default(),
            degenerate: DegeneratePolicy::default(),
            learner: LearnerSpec::default(),
        }
    }
}

impl CvConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CvConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Checks the values that do not depend on the dataset. Fold count against
    /// sample count is checked when the folds are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folds < 2 {
            return Err(ConfigError::Invalid(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.top_features == 0 {
            return Err(ConfigError::Invalid(
                "top_features must be at least 1".to_string(),
            ));
        }
        self.learner
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("learner: {e}")))?;
        Ok(())
    }
}
