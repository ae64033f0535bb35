//! In-process [`StoragePort`] implementation
//!
//! Used by tests, benches and single-process deployments. Upserts are atomic
//! per key because every write takes the table lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use aqe_core::{AgentInstanceId, AgentType, Result};

use crate::storage::{
    AgentLearningStats, BestAction, NewTrajectory, QEntry, QValueWrite, StoragePort,
    TrajectoryRecord, Q_VALUES_TABLE, TRAJECTORIES_TABLE,
};

type QKey = (AgentType, String, String);

/// Number of calls received per port method
#[derive(Debug, Default)]
struct CallCounters {
    get_q_value: AtomicU64,
    upsert_q_value: AtomicU64,
    get_best_action: AtomicU64,
    store_trajectory: AtomicU64,
    update_agent_state: AtomicU64,
    cleanup_expired: AtomicU64,
}

/// Snapshot of [`InMemoryStore`] call counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCalls {
    pub get_q_value: u64,
    pub upsert_q_value: u64,
    pub get_best_action: u64,
    pub store_trajectory: u64,
    pub update_agent_state: u64,
    pub cleanup_expired: u64,
}

impl StoreCalls {
    pub fn total(&self) -> u64 {
        self.get_q_value
            + self.upsert_q_value
            + self.get_best_action
            + self.store_trajectory
            + self.update_agent_state
            + self.cleanup_expired
    }
}

/// Hash-map backed store with TTL expiry
pub struct InMemoryStore {
    ttl: chrono::Duration,
    q_values: RwLock<HashMap<QKey, QEntry>>,
    trajectories: RwLock<Vec<TrajectoryRecord>>,
    agents: RwLock<HashMap<(AgentType, AgentInstanceId), AgentLearningStats>>,
    calls: CallCounters,
}

impl InMemoryStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            q_values: RwLock::new(HashMap::new()),
            trajectories: RwLock::new(Vec::new()),
            agents: RwLock::new(HashMap::new()),
            calls: CallCounters::default(),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Full row for a key, expired or not
    pub async fn entry(
        &self,
        agent_type: AgentType,
        state_hash: &str,
        action_hash: &str,
    ) -> Option<QEntry> {
        let key = (agent_type, state_hash.to_string(), action_hash.to_string());
        self.q_values.read().await.get(&key).cloned()
    }

    pub async fn q_value_count(&self) -> usize {
        self.q_values.read().await.len()
    }

    pub async fn entries_for(&self, agent_type: AgentType) -> Vec<QEntry> {
        self.q_values
            .read()
            .await
            .values()
            .filter(|e| e.agent_type == agent_type)
            .cloned()
            .collect()
    }

    pub async fn trajectories(&self) -> Vec<TrajectoryRecord> {
        self.trajectories.read().await.clone()
    }

    pub async fn agent_state(
        &self,
        agent_type: AgentType,
        instance_id: AgentInstanceId,
    ) -> Option<AgentLearningStats> {
        self.agents
            .read()
            .await
            .get(&(agent_type, instance_id))
            .cloned()
    }

    pub fn calls(&self) -> StoreCalls {
        let c = &self.calls;
        StoreCalls {
            get_q_value: c.get_q_value.load(Ordering::Relaxed),
            upsert_q_value: c.upsert_q_value.load(Ordering::Relaxed),
            get_best_action: c.get_best_action.load(Ordering::Relaxed),
            store_trajectory: c.store_trajectory.load(Ordering::Relaxed),
            update_agent_state: c.update_agent_state.load(Ordering::Relaxed),
            cleanup_expired: c.cleanup_expired.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(chrono::Duration::days(30))
    }
}

#[async_trait]
impl StoragePort for InMemoryStore {
    async fn get_q_value(
        &self,
        agent_type: AgentType,
        state_hash: &str,
        action_hash: &str,
    ) -> Result<Option<f64>> {
        self.calls.get_q_value.fetch_add(1, Ordering::Relaxed);
        let key = (agent_type, state_hash.to_string(), action_hash.to_string());
        let now = Utc::now();
        Ok(self
            .q_values
            .read()
            .await
            .get(&key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.q_value))
    }

    async fn upsert_q_value(&self, write: QValueWrite) -> Result<Uuid> {
        self.calls.upsert_q_value.fetch_add(1, Ordering::Relaxed);
        let key = (
            write.agent_type,
            write.state_hash.clone(),
            write.action_hash.clone(),
        );
        let now = Utc::now();

        let mut table = self.q_values.write().await;
        let id = match table.get_mut(&key) {
            // An expired row is replaced, not revived
            Some(entry) if !entry.is_expired(now) => {
                entry.apply(write, now, self.ttl);
                entry.id
            }
            _ => {
                let entry = QEntry::insert(write, now, self.ttl);
                let id = entry.id;
                table.insert(key, entry);
                id
            }
        };
        Ok(id)
    }

    async fn get_best_action(
        &self,
        agent_type: AgentType,
        state_hash: &str,
    ) -> Result<Option<BestAction>> {
        self.calls.get_best_action.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let table = self.q_values.read().await;

        let best = table
            .values()
            .filter(|e| e.agent_type == agent_type && e.state_hash == state_hash)
            .filter(|e| !e.is_expired(now))
            .max_by(|a, b| {
                a.q_value
                    .total_cmp(&b.q_value)
                    .then(a.confidence_score.total_cmp(&b.confidence_score))
            });
        Ok(best.map(BestAction::from))
    }

    async fn store_trajectory(&self, trajectory: NewTrajectory) -> Result<Uuid> {
        self.calls.store_trajectory.fetch_add(1, Ordering::Relaxed);
        let record = TrajectoryRecord::resolve(trajectory, Utc::now(), self.ttl);
        let id = record.id;
        self.trajectories.write().await.push(record);
        Ok(id)
    }

    async fn update_agent_state(&self, mut stats: AgentLearningStats) -> Result<()> {
        self.calls.update_agent_state.fetch_add(1, Ordering::Relaxed);
        stats.recompute_avg();
        self.agents
            .write()
            .await
            .insert((stats.agent_type, stats.agent_instance_id), stats);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<HashMap<String, u64>> {
        self.calls.cleanup_expired.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();

        let q_deleted = {
            let mut table = self.q_values.write().await;
            let before = table.len();
            table.retain(|_, e| !e.is_expired(now));
            (before - table.len()) as u64
        };
        let t_deleted = {
            let mut table = self.trajectories.write().await;
            let before = table.len();
            table.retain(|t| t.expires_at > now);
            (before - table.len()) as u64
        };

        debug!(q_deleted, t_deleted, "Expired rows removed");

        Ok(HashMap::from([
            (Q_VALUES_TABLE.to_string(), q_deleted),
            (TRAJECTORIES_TABLE.to_string(), t_deleted),
        ]))
    }
}
