//! Error types for the learning engine

use thiserror::Error;

/// Main error type for learning operations
#[derive(Error, Debug)]
pub enum LearningError {
    /// Invalid hyperparameter, unregistered agent type, or malformed action space.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Task context could not be canonicalized into a state.
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid reward: {0} (reward must be finite)")]
    InvalidReward(f64),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Action space error: {0}")]
    ActionSpace(String),
}

impl LearningError {
    /// Whether the error comes from construction and must never be retried.
    ///
    /// Everything else is a per-call error that the episode loop turns into a
    /// failed step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LearningError::Configuration(_))
    }

    /// Storage failures degrade learning but never stop it.
    pub fn is_storage(&self) -> bool {
        matches!(self, LearningError::StorageUnavailable(_))
    }
}

/// Result type alias for learning operations
pub type Result<T> = std::result::Result<T, LearningError>;
