//! Drift-adaptive ensemble learning for classification over data streams.
//!
//! The [`engine::Ddd`] controller keeps four ensemble populations (new/old,
//! low/high diversity), watches a drift detector and decides at every step
//! which populations to trust and when to regenerate them.

pub mod algo;
pub mod config;
pub mod engine;
pub mod error;
pub mod learner;

pub use algo::{Ddm, DiversityWrapper, DriftDetector, OnlineBagging, PrequentialMetrics};
pub use config::{DddConfig, PopulationConfig};
pub use engine::{Ddd, DddStats, Mode, Population, VotingWeights};
pub use error::{DddError, Result};
pub use learner::{Label, OnlineLearner, Scores};
