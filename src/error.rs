//! Error taxonomy for the drift-adaptive ensemble.

/// Errors surfaced by learners, metrics and the controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DddError {
    /// Empty batch, mismatched lengths or ragged feature rows.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Prediction requested from a learner that has never been updated.
    #[error("Learner not fitted: {0}")]
    NotFitted(String),

    /// Controller is after a drift but the old populations are missing.
    /// Indicates a broken internal invariant and is not recoverable.
    #[error("Controller not ready: {0}")]
    NotReady(String),

    /// Score matrices that cannot be combined or decoded.
    #[error("Score shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DddError>;
