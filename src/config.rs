//! Controller and population configuration.

use crate::error::{DddError, Result};
use crate::learner::Label;
use serde::{Deserialize, Serialize};

/// Default multiplier for the old low-diversity voting weight.
pub const DEFAULT_W: f64 = 0.1;
/// Poisson rate giving bootstrap-like (low diversity) resampling.
pub const LOW_DIVERSITY_LAMBDA: f64 = 1.0;
/// Poisson rate giving sparse (high diversity) resampling.
pub const HIGH_DIVERSITY_LAMBDA: f64 = 0.1;
pub const DEFAULT_ESTIMATORS: usize = 25;

/// Settings for one ensemble population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Poisson resampling rate of every member
    pub lambda_diversity: f64,
    /// Number of diversity-wrapped members
    #[serde(default = "default_estimators")]
    pub n_estimators: usize,
    /// Full known label set
    pub classes: Vec<Label>,
    /// Seed for the members' resampling generators
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_estimators() -> usize {
    DEFAULT_ESTIMATORS
}

impl PopulationConfig {
    pub fn low_diversity(classes: Vec<Label>) -> Self {
        Self {
            lambda_diversity: LOW_DIVERSITY_LAMBDA,
            n_estimators: DEFAULT_ESTIMATORS,
            classes,
            seed: None,
        }
    }

    pub fn high_diversity(classes: Vec<Label>) -> Self {
        Self {
            lambda_diversity: HIGH_DIVERSITY_LAMBDA,
            n_estimators: DEFAULT_ESTIMATORS,
            classes,
            seed: None,
        }
    }

    pub fn with_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lambda_diversity.is_finite() || self.lambda_diversity <= 0.0 {
            return Err(DddError::InvalidConfig(format!(
                "lambda_diversity must be positive, got {}",
                self.lambda_diversity
            )));
        }
        if self.n_estimators == 0 {
            return Err(DddError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        let mut distinct = self.classes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() != self.classes.len() {
            return Err(DddError::InvalidConfig(format!(
                "duplicate labels in class list {:?}",
                self.classes
            )));
        }
        if distinct.len() < 2 {
            return Err(DddError::InvalidConfig(
                "at least two classes are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DddConfig {
    /// Weight multiplier of the old low-diversity population
    #[serde(default = "default_w")]
    pub w: f64,
    pub low: PopulationConfig,
    pub high: PopulationConfig,
    /// Seed for deriving per-population seeds; OS entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_w() -> f64 {
    DEFAULT_W
}

impl DddConfig {
    /// Standard low/high diversity pair over `classes`.
    pub fn new(classes: Vec<Label>) -> Self {
        Self {
            w: DEFAULT_W,
            low: PopulationConfig::low_diversity(classes.clone()),
            high: PopulationConfig::high_diversity(classes),
            seed: None,
        }
    }

    pub fn with_w(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    pub fn with_estimators(mut self, n: usize) -> Self {
        self.low.n_estimators = n;
        self.high.n_estimators = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DddConfig = serde_json::from_str(json)
            .map_err(|e| DddError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Label set shared by both populations.
    pub fn classes(&self) -> &[Label] {
        &self.low.classes
    }

    pub fn validate(&self) -> Result<()> {
        if !self.w.is_finite() || self.w < 0.0 {
            return Err(DddError::InvalidConfig(format!(
                "w must be a non-negative number, got {}",
                self.w
            )));
        }
        self.low.validate()?;
        self.high.validate()?;
        if self.low.classes != self.high.classes {
            return Err(DddError::InvalidConfig(format!(
                "class lists differ between populations: {:?} vs {:?}",
                self.low.classes, self.high.classes
            )));
        }
        Ok(())
    }
}
