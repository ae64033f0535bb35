//! Common identifiers used throughout the fleet

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session identifier, shared by every write one agent session makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status reported in per-agent learning stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStatus {
    /// Learning normally
    Active,
    /// Last episode could not be persisted
    Degraded,
    /// No episodes run yet
    Idle,
}

impl std::fmt::Display for LearningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearningStatus::Active => write!(f, "active"),
            LearningStatus::Degraded => write!(f, "degraded"),
            LearningStatus::Idle => write!(f, "idle"),
        }
    }
}
