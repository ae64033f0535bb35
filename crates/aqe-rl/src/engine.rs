//! Episode loop - drives select / execute / reward / update until terminal

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use aqe_core::util::truncate_message;
use aqe_core::{LearningError, Result, SessionId};

use crate::algorithm::QLearningCore;
use crate::reward::OutcomeMetadata;
use crate::state::{Action, Reward};
use crate::trajectory::TrajectoryBuilder;

/// Longest error text kept in a step record or trajectory
const MAX_ERROR_CHARS: usize = 500;

/// What the agent reports after running an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub next_context: Value,
    pub done: bool,
    #[serde(default)]
    pub metadata: OutcomeMetadata,
}

impl ExecutionOutcome {
    /// Successful, non-terminal outcome
    pub fn success(next_context: Value) -> Self {
        Self {
            success: true,
            next_context,
            done: false,
            metadata: OutcomeMetadata::default(),
        }
    }

    /// Failed outcome; the step is scored through the failure penalty
    pub fn failure(next_context: Value) -> Self {
        Self {
            success: false,
            next_context,
            done: false,
            metadata: OutcomeMetadata::failed(),
        }
    }

    pub fn done(mut self) -> Self {
        self.done = true;
        self
    }

    pub fn with_metadata(mut self, metadata: OutcomeMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Runs a selected action on behalf of the learning loop.
///
/// Errors belong to the caller's domain, hence `anyhow`.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action, context: &Value) -> anyhow::Result<ExecutionOutcome>;
}

#[async_trait]
impl<F, Fut> ActionExecutor for F
where
    F: Fn(Action, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ExecutionOutcome>> + Send + 'static,
{
    async fn execute(&self, action: &Action, context: &Value) -> anyhow::Result<ExecutionOutcome> {
        (self)(action.clone(), context.clone()).await
    }
}

/// One step of an episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub action_id: Option<String>,
    pub reward: Option<Reward>,
    pub q_value: Option<f64>,
    pub success: bool,
    pub error: Option<String>,
}

impl StepRecord {
    fn aborted(step: usize, error: &LearningError) -> Self {
        Self {
            step,
            action_id: None,
            reward: None,
            q_value: None,
            success: false,
            error: Some(truncate_message(&error.to_string(), MAX_ERROR_CHARS)),
        }
    }
}

/// Result of [`QLearningCore::execute_learning_episode`]
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeSummary {
    pub session_id: SessionId,
    pub task_id: String,
    pub steps: Vec<StepRecord>,
    pub total_reward: Reward,
    pub discounted_reward: Reward,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub final_context: Value,
    pub final_epsilon: f64,
    /// `None` when the store rejected the write
    pub trajectory_id: Option<Uuid>,
}

impl QLearningCore {
    /// Run one episode against `executor`, learning from every step.
    ///
    /// Only `max_steps == 0` is an error. Everything that goes wrong inside
    /// the loop is recorded as a failed step and the episode is still logged.
    pub async fn execute_learning_episode<E>(
        &mut self,
        initial_context: Value,
        executor: &E,
        max_steps: usize,
    ) -> Result<EpisodeSummary>
    where
        E: ActionExecutor + ?Sized,
    {
        if max_steps == 0 {
            return Err(LearningError::Configuration(
                "max_steps must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let task_id = initial_context
            .get("task_id")
            .and_then(Value::as_str)
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        let mut trajectory = TrajectoryBuilder::new(
            self.agent_type(),
            self.session_id(),
            task_id.clone(),
            initial_context.clone(),
            self.config().discount_factor,
        );
        let mut steps = Vec::new();
        let mut error_message: Option<String> = None;
        let mut context = initial_context;

        for step in 0..max_steps {
            let state = match self.encoder.encode(&context) {
                Ok(state) => state,
                Err(e) => {
                    steps.push(StepRecord::aborted(step, &e));
                    error_message = Some(e.to_string());
                    break;
                }
            };
            let action = match self.select_for_state(&state, true).await {
                Ok(action) => action,
                Err(e) => {
                    steps.push(StepRecord::aborted(step, &e));
                    error_message = Some(e.to_string());
                    break;
                }
            };

            let (outcome, executor_error) = match executor.execute(&action, &context).await {
                Ok(outcome) => (outcome, None),
                Err(e) => {
                    let message = truncate_message(&format!("{e:#}"), MAX_ERROR_CHARS);
                    warn!(
                        agent_type = %self.agent_type(),
                        action = %action,
                        error = %message,
                        "Action execution failed"
                    );
                    (ExecutionOutcome::failure(context.clone()).done(), Some(message))
                }
            };

            let mut metadata = outcome.metadata.clone();
            metadata.task_failed = metadata.task_failed || !outcome.success;
            let reward =
                self.reward_calculator
                    .calculate(&context, &action, &outcome.next_context, &metadata);

            let mut step_error = executor_error.clone();
            let mut encode_error = None;
            let q_value = if reward.is_finite() {
                trajectory.push(&state, &action, reward);
                let next_state = if outcome.done {
                    Ok(None)
                } else {
                    self.encoder.encode(&outcome.next_context).map(Some)
                };
                match next_state {
                    Ok(next_state) => Some(
                        self.update_encoded(&state, &action, reward, next_state.as_ref())
                            .await,
                    ),
                    Err(e) => {
                        // No bootstrap target exists for an unencodable next state
                        warn!(
                            agent_type = %self.agent_type(),
                            error = %e,
                            "Next context not encodable, skipping Q-value update"
                        );
                        step_error = Some(e.to_string());
                        encode_error = Some(e.to_string());
                        None
                    }
                }
            } else {
                let e = LearningError::InvalidReward(reward);
                warn!(agent_type = %self.agent_type(), error = %e, "Skipping Q-value update");
                trajectory.push(&state, &action, 0.0);
                step_error = Some(e.to_string());
                None
            };

            self.decay_epsilon(reward.is_finite().then_some(reward));
            self.stats.total_steps += 1;

            let step_success = outcome.success && step_error.is_none();
            debug!(
                agent_type = %self.agent_type(),
                step,
                action = %action,
                reward,
                success = step_success,
                "Episode step"
            );
            steps.push(StepRecord {
                step,
                action_id: Some(action.action_id.clone()),
                reward: reward.is_finite().then_some(reward),
                q_value,
                success: step_success,
                error: step_error,
            });

            if let Some(message) = executor_error.or(encode_error) {
                error_message = Some(message);
                break;
            }
            context = outcome.next_context;
            if outcome.done {
                break;
            }
        }

        let success = error_message.is_none() && steps.iter().all(|s| s.success);
        let total_reward = trajectory.total_reward();
        let discounted_reward = trajectory.discounted_reward();
        let execution_time_ms = started.elapsed().as_millis() as u64;
        self.stats.record_episode(success, total_reward);

        let completed_at = Utc::now();
        let expires_at = completed_at + self.config().expiry_ttl();
        let record = trajectory.finish(
            context.clone(),
            success,
            error_message.clone(),
            execution_time_ms,
            completed_at,
            expires_at,
        );

        let trajectory_id = match self.client.store_trajectory(record).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(agent_type = %self.agent_type(), error = %e, "Failed to store trajectory");
                None
            }
        };
        if let Err(e) = self
            .client
            .update_agent_state(self.agent_learning_stats())
            .await
        {
            warn!(agent_type = %self.agent_type(), error = %e, "Failed to update agent state");
        }

        info!(
            agent_type = %self.agent_type(),
            task_id = %task_id,
            steps = steps.len(),
            total_reward,
            success,
            epsilon = self.epsilon(),
            "Learning episode complete"
        );

        Ok(EpisodeSummary {
            session_id: self.session_id(),
            task_id,
            steps,
            total_reward,
            discounted_reward,
            success,
            error_message,
            execution_time_ms,
            final_context: context,
            final_epsilon: self.epsilon(),
            trajectory_id,
        })
    }
}
