//! Episode trajectory accumulation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use aqe_core::{AgentType, SessionId};

use crate::state::{Action, EncodedState, Reward};
use crate::storage::NewTrajectory;

/// One (s, a, r) step of an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state_hash: String,
    pub action_id: String,
    pub reward: Reward,
}

/// Collects the steps of one episode and produces the stored record.
#[derive(Debug, Clone)]
pub struct TrajectoryBuilder {
    agent_type: AgentType,
    session_id: SessionId,
    task_id: String,
    initial_state: Value,
    discount_factor: f64,
    transitions: Vec<Transition>,
}

impl TrajectoryBuilder {
    pub fn new(
        agent_type: AgentType,
        session_id: SessionId,
        task_id: impl Into<String>,
        initial_state: Value,
        discount_factor: f64,
    ) -> Self {
        Self {
            agent_type,
            session_id,
            task_id: task_id.into(),
            initial_state,
            discount_factor,
            transitions: Vec::new(),
        }
    }

    pub fn push(&mut self, state: &EncodedState, action: &Action, reward: Reward) {
        self.transitions.push(Transition {
            state_hash: state.state_hash.clone(),
            action_id: action.action_id.clone(),
            reward,
        });
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn total_reward(&self) -> Reward {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    /// `sum(gamma^t * r_t)`
    pub fn discounted_reward(&self) -> Reward {
        let mut discount = 1.0;
        let mut total = 0.0;
        for t in &self.transitions {
            total += discount * t.reward;
            discount *= self.discount_factor;
        }
        total
    }

    pub fn finish(
        self,
        final_state: Value,
        success: bool,
        error_message: Option<String>,
        execution_time_ms: u64,
        completed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> NewTrajectory {
        let total_reward = self.total_reward();
        let discounted_reward = self.discounted_reward();
        let (states_visited, (actions_taken, step_rewards)): (Vec<_>, (Vec<_>, Vec<_>)) = self
            .transitions
            .into_iter()
            .map(|t| (t.state_hash, (t.action_id, t.reward)))
            .unzip();

        NewTrajectory {
            agent_type: self.agent_type,
            session_id: self.session_id,
            task_id: self.task_id,
            initial_state: self.initial_state,
            final_state,
            actions_taken,
            states_visited,
            step_rewards,
            total_reward,
            discounted_reward,
            execution_time_ms,
            success,
            error_message,
            completed_at: Some(completed_at),
            expires_at: Some(expires_at),
        }
    }
}
