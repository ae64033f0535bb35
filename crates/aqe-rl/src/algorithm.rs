//! Tabular Q-learning core
//!
//! One [`QLearningCore`] per agent instance. It owns its exploration state and
//! local [`QValueCache`]; the shared store is reached only through a
//! [`StoreClient`].

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use aqe_core::{AgentInstanceId, AgentType, LearningError, LearningStatus, Result, SessionId};

use crate::cache::QValueCache;
use crate::config::{ExplorationPolicy, LearningConfig};
use crate::registry::AgentRegistry;
use crate::reward::RewardCalculator;
use crate::state::{Action, ActionSpace, EncodedState, Reward, StateEncoder};
use crate::storage::{AgentLearningStats, StoragePort, StoreClient};

/// Recent reward at or above which reward-based decay exploits harder
pub const STRONG_REWARD_THRESHOLD: f64 = 30.0;

/// Running counters for one core
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningStats {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub total_reward: f64,
    pub total_steps: u64,
    pub exploration_count: u64,
    pub exploitation_count: u64,
    pub q_updates: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
}

impl LearningStats {
    pub fn avg_reward(&self) -> f64 {
        if self.total_tasks > 0 {
            self.total_reward / self.total_tasks as f64
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_tasks > 0 {
            self.successful_tasks as f64 / self.total_tasks as f64
        } else {
            0.0
        }
    }

    pub fn record_episode(&mut self, success: bool, reward: Reward) {
        self.total_tasks += 1;
        if success {
            self.successful_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        self.total_reward += reward;
    }
}

/// Epsilon-greedy tabular Q-learning for a single agent type
pub struct QLearningCore {
    agent_type: AgentType,
    instance_id: AgentInstanceId,
    config: LearningConfig,
    pub(crate) encoder: StateEncoder,
    actions: ActionSpace,
    pub(crate) reward_calculator: RewardCalculator,
    pub(crate) client: StoreClient,
    cache: QValueCache,
    epsilon: f64,
    rng: StdRng,
    pub(crate) stats: LearningStats,
    degraded: bool,
}

impl QLearningCore {
    /// Build a core for `agent_type`; fails before allocating anything on bad config.
    pub fn new(
        agent_type: AgentType,
        registry: &AgentRegistry,
        config: LearningConfig,
        store: Arc<dyn StoragePort>,
    ) -> Result<Self> {
        config.validate()?;
        let profile = registry.profile(agent_type)?;

        let encoder = StateEncoder::with_extractor(agent_type, Arc::clone(&profile.extractor));
        let reward_calculator = RewardCalculator::new(config.reward_weights)
            .with_adjustment(profile.reward_adjustment);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            agent_type = %agent_type,
            actions = profile.action_space.len(),
            learning_rate = config.learning_rate,
            discount_factor = config.discount_factor,
            epsilon = config.initial_exploration_rate,
            sync_interval = config.sync_interval,
            "Q-learning core initialized"
        );

        Ok(Self {
            agent_type,
            instance_id: AgentInstanceId::new(),
            encoder,
            actions: profile.action_space.clone(),
            reward_calculator,
            client: StoreClient::new(store, agent_type, SessionId::new()),
            cache: QValueCache::new(config.sync_interval),
            epsilon: config.initial_exploration_rate,
            rng,
            stats: LearningStats::default(),
            degraded: false,
            config,
        })
    }

    pub fn with_instance_id(mut self, instance_id: AgentInstanceId) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.client = self.client.with_session(session_id);
        self
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn instance_id(&self) -> AgentInstanceId {
        self.instance_id
    }

    pub fn session_id(&self) -> SessionId {
        self.client.session_id()
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.actions
    }

    pub fn encoder(&self) -> &StateEncoder {
        &self.encoder
    }

    pub fn reward_calculator(&self) -> &RewardCalculator {
        &self.reward_calculator
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn stats(&self) -> LearningStats {
        self.stats.clone()
    }

    /// Local cached value for a key, without a store lookup
    pub fn cached_q_value(&self, state: &EncodedState, action: &Action) -> Option<f64> {
        self.cache.peek(&state.state_hash, &action.action_hash)
    }

    /// Choose an action for `context`.
    ///
    /// With `explore` set, a uniform draw below epsilon picks a random action;
    /// otherwise the highest Q-value wins, ties going to the earlier action.
    pub async fn select_action(&mut self, context: &Value, explore: bool) -> Result<Action> {
        self.ensure_actions()?;
        let state = self.encoder.encode(context)?;
        self.select_for_state(&state, explore).await
    }

    pub(crate) async fn select_for_state(
        &mut self,
        state: &EncodedState,
        explore: bool,
    ) -> Result<Action> {
        self.ensure_actions()?;

        if explore && self.rng.gen::<f64>() < self.epsilon {
            let idx = self.rng.gen_range(0..self.actions.len());
            let action = self.actions.actions()[idx].clone();
            self.stats.exploration_count += 1;
            debug!(agent_type = %self.agent_type, action = %action, epsilon = self.epsilon, "Exploring");
            return Ok(action);
        }

        let (action, q_value) = self.greedy(state).await?;
        self.stats.exploitation_count += 1;
        debug!(agent_type = %self.agent_type, action = %action, q_value, "Exploiting");
        Ok(action)
    }

    async fn greedy(&mut self, state: &EncodedState) -> Result<(Action, f64)> {
        let mut best: Option<(&Action, f64)> = None;
        for action in self.actions.actions() {
            let q = self.cache.get(&self.client, &state.state_hash, action).await;
            if best.map_or(true, |(_, best_q)| q > best_q) {
                best = Some((action, q));
            }
        }
        best.map(|(action, q)| (action.clone(), q))
            .ok_or_else(|| self.empty_action_space())
    }

    async fn max_q(&mut self, state: &EncodedState) -> f64 {
        let mut max: Option<f64> = None;
        for action in self.actions.actions() {
            let q = self.cache.get(&self.client, &state.state_hash, action).await;
            max = Some(max.map_or(q, |m| m.max(q)));
        }
        max.unwrap_or(0.0)
    }

    /// Apply one Bellman update and return the new Q-value.
    ///
    /// `state_after` is ignored when `done` is set.
    pub async fn update_q_value(
        &mut self,
        state_before: &Value,
        action: &Action,
        reward: Reward,
        state_after: Option<&Value>,
        done: bool,
    ) -> Result<f64> {
        if !reward.is_finite() {
            return Err(LearningError::InvalidReward(reward));
        }
        let before = self.encoder.encode(state_before)?;
        let after = match state_after {
            Some(context) if !done => Some(self.encoder.encode(context)?),
            _ => None,
        };
        Ok(self
            .update_encoded(&before, action, reward, after.as_ref())
            .await)
    }

    /// Bellman update on already encoded states. `reward` must be finite.
    pub(crate) async fn update_encoded(
        &mut self,
        before: &EncodedState,
        action: &Action,
        reward: Reward,
        after: Option<&EncodedState>,
    ) -> f64 {
        let old_q = self.cache.get(&self.client, &before.state_hash, action).await;
        let max_next_q = match after {
            Some(next) => self.max_q(next).await,
            None => 0.0,
        };

        let alpha = self.config.learning_rate;
        let gamma = self.config.discount_factor;
        let new_q = old_q + alpha * (reward + gamma * max_next_q - old_q);

        self.stats.q_updates += 1;
        debug!(
            agent_type = %self.agent_type,
            action = %action,
            reward,
            old_q,
            max_next_q,
            new_q,
            "Q-value updated"
        );

        if self.cache.put(before, action, new_q) {
            if let Err(e) = self.flush().await {
                warn!(
                    agent_type = %self.agent_type,
                    error = %e,
                    retained = self.cache.dirty_len(),
                    "Q-value sync failed, continuing with local values"
                );
            }
        }
        new_q
    }

    /// Move epsilon according to the configured policy and return it.
    pub fn decay_epsilon(&mut self, recent_reward: Option<Reward>) -> f64 {
        let decay = self.config.exploration_decay;
        let next = match (self.config.exploration_policy, recent_reward) {
            (ExplorationPolicy::RewardBased, Some(r)) if r < 0.0 => self.epsilon * (2.0 - decay),
            (ExplorationPolicy::RewardBased, Some(r)) if r >= STRONG_REWARD_THRESHOLD => {
                self.epsilon * decay
            }
            (ExplorationPolicy::RewardBased, Some(_)) => self.epsilon,
            _ => self.epsilon * decay,
        };
        self.epsilon = next.clamp(
            self.config.min_exploration_rate,
            self.config.max_exploration_rate,
        );
        self.epsilon
    }

    /// Write every dirty cached value to the store.
    ///
    /// Clean entries that were only read through are not written back, so
    /// reads never bump a row's `visit_count`. On failure the unwritten entries stay dirty and the error is returned.
    pub async fn flush(&mut self) -> Result<usize> {
        let report = self.cache.flush(&self.client).await;
        match report.error {
            None => {
                self.stats.flushes += 1;
                self.degraded = false;
                if report.written > 0 {
                    info!(
                        agent_type = %self.agent_type,
                        written = report.written,
                        "Q-values synced to store"
                    );
                }
                Ok(report.written)
            }
            Some(e) => {
                self.stats.failed_flushes += 1;
                self.degraded = true;
                Err(e)
            }
        }
    }

    /// Best action the store knows for `context`, else the local greedy choice.
    ///
    /// `None` only when the action space is empty.
    pub async fn best_known_action(&mut self, context: &Value) -> Result<Option<Action>> {
        if self.actions.is_empty() {
            return Ok(None);
        }
        let state = self.encoder.encode(context)?;

        match self.client.get_best_action(&state.state_hash).await {
            Ok(Some(best)) => {
                if let Some(action) = self
                    .actions
                    .actions()
                    .iter()
                    .find(|a| a.action_hash == best.action_hash)
                {
                    return Ok(Some(action.clone()));
                }
                debug!(
                    agent_type = %self.agent_type,
                    action_hash = %best.action_hash,
                    "Stored best action is not in the action space"
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!(agent_type = %self.agent_type, error = %e, "Best-action lookup failed");
            }
        }

        let (action, _) = self.greedy(&state).await?;
        Ok(Some(action))
    }

    /// Hyperparameters and cache state as JSON
    pub fn params(&self) -> Value {
        serde_json::json!({
            "agent_type": self.agent_type,
            "learning_rate": self.config.learning_rate,
            "discount_factor": self.config.discount_factor,
            "epsilon": self.epsilon,
            "min_exploration_rate": self.config.min_exploration_rate,
            "max_exploration_rate": self.config.max_exploration_rate,
            "exploration_decay": self.config.exploration_decay,
            "exploration_policy": self.config.exploration_policy,
            "sync_interval": self.config.sync_interval,
            "action_count": self.actions.len(),
            "cached_entries": self.cache.len(),
            "dirty_entries": self.cache.dirty_len(),
        })
    }

    /// Row for [`StoragePort::update_agent_state`]
    pub fn agent_learning_stats(&self) -> AgentLearningStats {
        let status = if self.degraded {
            LearningStatus::Degraded
        } else if self.stats.total_tasks == 0 {
            LearningStatus::Idle
        } else {
            LearningStatus::Active
        };
        AgentLearningStats {
            agent_type: self.agent_type,
            agent_instance_id: self.instance_id,
            total_tasks: self.stats.total_tasks,
            successful_tasks: self.stats.successful_tasks,
            failed_tasks: self.stats.failed_tasks,
            total_reward: self.stats.total_reward,
            avg_reward: self.stats.avg_reward(),
            current_exploration_rate: self.epsilon,
            current_learning_rate: self.config.learning_rate,
            status,
            last_activity: Utc::now(),
        }
    }

    fn ensure_actions(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(self.empty_action_space());
        }
        Ok(())
    }

    fn empty_action_space(&self) -> LearningError {
        LearningError::ActionSpace(format!(
            "no actions registered for agent type {}",
            self.agent_type
        ))
    }
}

impl std::fmt::Debug for QLearningCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QLearningCore")
            .field("agent_type", &self.agent_type)
            .field("instance_id", &self.instance_id)
            .field("epsilon", &self.epsilon)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
