//! Storage port for durable Q-values, trajectories and agent statistics
//!
//! The learning core never talks to a database directly. It holds an
//! `Arc<dyn StoragePort>` wrapped in a [`StoreClient`], which binds the agent
//! type and session and traces every call with its latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use aqe_core::{AgentInstanceId, AgentType, LearningStatus, Result, SessionId};

use crate::state::{Action, EncodedState};

/// Confidence and uncertainty of a freshly inserted Q-value
pub const INITIAL_CONFIDENCE: f64 = 0.5;

/// Confidence gained (and uncertainty lost) per overwrite
pub const CONFIDENCE_STEP: f64 = 0.05;

/// Table names reported by [`StoragePort::cleanup_expired`]
pub const Q_VALUES_TABLE: &str = "q_values";
pub const TRAJECTORIES_TABLE: &str = "trajectories";

/// A durable Q-value row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub id: Uuid,
    pub agent_type: AgentType,
    pub state_hash: String,
    pub action_hash: String,
    pub state_data: Value,
    pub action_data: Value,
    pub q_value: f64,
    pub visit_count: u64,
    pub confidence_score: f64,
    pub uncertainty: f64,
    pub session_id: Option<SessionId>,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QEntry {
    /// First write of a key
    pub fn insert(write: QValueWrite, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type: write.agent_type,
            state_hash: write.state_hash,
            action_hash: write.action_hash,
            state_data: write.state_data,
            action_data: write.action_data,
            q_value: write.q_value,
            visit_count: 1,
            confidence_score: INITIAL_CONFIDENCE,
            uncertainty: INITIAL_CONFIDENCE,
            session_id: write.session_id,
            last_updated: now,
            expires_at: now + ttl,
        }
    }

    /// Overwrite in place, keeping the row id.
    pub fn apply(&mut self, write: QValueWrite, now: DateTime<Utc>, ttl: chrono::Duration) {
        self.q_value = write.q_value;
        self.state_data = write.state_data;
        self.action_data = write.action_data;
        self.session_id = write.session_id.or(self.session_id);
        self.visit_count += 1;
        self.confidence_score = (self.confidence_score + CONFIDENCE_STEP).min(1.0);
        self.uncertainty = (self.uncertainty - CONFIDENCE_STEP).max(0.0);
        self.last_updated = now;
        self.expires_at = now + ttl;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Upsert request for one `(agent_type, state_hash, action_hash)` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QValueWrite {
    pub agent_type: AgentType,
    pub state_hash: String,
    pub action_hash: String,
    pub q_value: f64,
    pub state_data: Value,
    pub action_data: Value,
    pub session_id: Option<SessionId>,
}

/// Highest-valued action recorded for a state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestAction {
    pub action_hash: String,
    pub action_data: Value,
    pub q_value: f64,
    pub confidence_score: f64,
    pub visit_count: u64,
}

impl From<&QEntry> for BestAction {
    fn from(entry: &QEntry) -> Self {
        Self {
            action_hash: entry.action_hash.clone(),
            action_data: entry.action_data.clone(),
            q_value: entry.q_value,
            confidence_score: entry.confidence_score,
            visit_count: entry.visit_count,
        }
    }
}

/// One episode, as handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrajectory {
    pub agent_type: AgentType,
    pub session_id: SessionId,
    pub task_id: String,
    pub initial_state: Value,
    pub final_state: Value,
    pub actions_taken: Vec<String>,
    pub states_visited: Vec<String>,
    pub step_rewards: Vec<f64>,
    pub total_reward: f64,
    pub discounted_reward: f64,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
    /// Defaults to the insertion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Defaults to `completed_at` plus the store's retention
    pub expires_at: Option<DateTime<Utc>>,
}

/// A stored, immutable trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub id: Uuid,
    pub trajectory: NewTrajectory,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TrajectoryRecord {
    /// Resolve the timestamps of a new trajectory.
    pub fn resolve(trajectory: NewTrajectory, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        let completed_at = trajectory.completed_at.unwrap_or(now);
        let elapsed =
            chrono::Duration::milliseconds(i64::try_from(trajectory.execution_time_ms).unwrap_or(0));
        let expires_at = trajectory.expires_at.unwrap_or(completed_at + ttl);
        Self {
            id: Uuid::new_v4(),
            started_at: completed_at - elapsed,
            completed_at,
            expires_at,
            trajectory,
        }
    }
}

/// Per-instance learning statistics, upserted after every episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLearningStats {
    pub agent_type: AgentType,
    pub agent_instance_id: AgentInstanceId,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub total_reward: f64,
    pub avg_reward: f64,
    pub current_exploration_rate: f64,
    pub current_learning_rate: f64,
    pub status: LearningStatus,
    pub last_activity: DateTime<Utc>,
}

impl AgentLearningStats {
    /// `avg_reward = total_reward / total_tasks`, 0 with no tasks
    pub fn recompute_avg(&mut self) {
        self.avg_reward = if self.total_tasks > 0 {
            self.total_reward / self.total_tasks as f64
        } else {
            0.0
        };
    }
}

/// Durable backing store consumed by the learning core.
///
/// Implementations must make `upsert_q_value` atomic per key, with
/// `visit_count` incremented by the store itself.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Current value of a key; expired rows are absent.
    async fn get_q_value(
        &self,
        agent_type: AgentType,
        state_hash: &str,
        action_hash: &str,
    ) -> Result<Option<f64>>;

    /// Insert or overwrite a key, returning the row id.
    async fn upsert_q_value(&self, write: QValueWrite) -> Result<Uuid>;

    /// Best action for a state, by q-value then confidence.
    async fn get_best_action(
        &self,
        agent_type: AgentType,
        state_hash: &str,
    ) -> Result<Option<BestAction>>;

    /// Append a trajectory, returning its id.
    async fn store_trajectory(&self, trajectory: NewTrajectory) -> Result<Uuid>;

    /// Idempotent upsert; the store recomputes `avg_reward`.
    async fn update_agent_state(&self, stats: AgentLearningStats) -> Result<()>;

    /// Delete expired rows, returning deleted counts per table.
    async fn cleanup_expired(&self) -> Result<HashMap<String, u64>>;
}

/// Storage port bound to one agent type and session
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn StoragePort>,
    agent_type: AgentType,
    session_id: SessionId,
}

impl StoreClient {
    pub fn new(store: Arc<dyn StoragePort>, agent_type: AgentType, session_id: SessionId) -> Self {
        Self {
            store,
            agent_type,
            session_id,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn store(&self) -> &Arc<dyn StoragePort> {
        &self.store
    }

    pub async fn get_q_value(&self, state_hash: &str, action_hash: &str) -> Result<Option<f64>> {
        let start = Instant::now();
        let result = self
            .store
            .get_q_value(self.agent_type, state_hash, action_hash)
            .await;
        debug!(
            agent_type = %self.agent_type,
            hit = matches!(result, Ok(Some(_))),
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "get_q_value"
        );
        result
    }

    pub async fn upsert_q_value(
        &self,
        state_hash: &str,
        action_hash: &str,
        q_value: f64,
        state_data: Value,
        action_data: Value,
    ) -> Result<Uuid> {
        let write = QValueWrite {
            agent_type: self.agent_type,
            state_hash: state_hash.to_string(),
            action_hash: action_hash.to_string(),
            q_value,
            state_data,
            action_data,
            session_id: Some(self.session_id),
        };
        let start = Instant::now();
        let result = self.store.upsert_q_value(write).await;
        debug!(
            agent_type = %self.agent_type,
            q_value,
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "upsert_q_value"
        );
        result
    }

    /// Convenience upsert straight from an encoded state and action
    pub async fn upsert_for(&self, state: &EncodedState, action: &Action, q_value: f64) -> Result<Uuid> {
        self.upsert_q_value(
            &state.state_hash,
            &action.action_hash,
            q_value,
            state.state_data(),
            action.action_data(),
        )
        .await
    }

    pub async fn get_best_action(&self, state_hash: &str) -> Result<Option<BestAction>> {
        let start = Instant::now();
        let result = self.store.get_best_action(self.agent_type, state_hash).await;
        debug!(
            agent_type = %self.agent_type,
            found = matches!(result, Ok(Some(_))),
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "get_best_action"
        );
        result
    }

    pub async fn store_trajectory(&self, trajectory: NewTrajectory) -> Result<Uuid> {
        let start = Instant::now();
        let steps = trajectory.actions_taken.len();
        let result = self.store.store_trajectory(trajectory).await;
        debug!(
            agent_type = %self.agent_type,
            session_id = %self.session_id,
            steps,
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "store_trajectory"
        );
        result
    }

    pub async fn update_agent_state(&self, stats: AgentLearningStats) -> Result<()> {
        let start = Instant::now();
        let result = self.store.update_agent_state(stats).await;
        debug!(
            agent_type = %self.agent_type,
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "update_agent_state"
        );
        result
    }

    pub async fn cleanup_expired(&self) -> Result<HashMap<String, u64>> {
        let start = Instant::now();
        let result = self.store.cleanup_expired().await;
        debug!(
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "cleanup_expired"
        );
        result
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("agent_type", &self.agent_type)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
