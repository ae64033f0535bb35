//! Fault-injecting storage port
//!
//! Wraps an [`InMemoryStore`] and fails or delays calls on demand. Failures
//! surface as `LearningError::StorageUnavailable`, the same error a real
//! backend would report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use uuid::Uuid;

use aqe_core::{AgentType, LearningError, Result};
use aqe_rl::storage::{AgentLearningStats, BestAction, NewTrajectory, QValueWrite, StoragePort};
use aqe_rl::InMemoryStore;

use crate::{ChaosError, ChaosResult, ChaosTestable, FaultType};

const UNLIMITED: u64 = u64::MAX;

/// Storage port with switchable faults
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    disconnected: AtomicBool,
    read_only: AtomicBool,
    /// Writes still allowed before failing; `UNLIMITED` disables the budget
    write_budget: AtomicU64,
    latency_ms: AtomicU64,
    /// Fail every Nth call; 0 disables
    fail_every: AtomicU64,
    calls: AtomicU64,
    rejected: AtomicU64,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            disconnected: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            write_budget: AtomicU64::new(UNLIMITED),
            latency_ms: AtomicU64::new(0),
            fail_every: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    pub fn rejected_calls(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    async fn gate(&self, operation: &str, is_write: bool) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }

        let every = self.fail_every.load(Ordering::SeqCst);
        let failure = if self.disconnected.load(Ordering::SeqCst) {
            Some("connection lost")
        } else if is_write && self.read_only.load(Ordering::SeqCst) {
            Some("store is read-only")
        } else if is_write && !self.take_write_budget() {
            Some("write budget exhausted")
        } else if every > 0 && call % every == 0 {
            Some("injected partial failure")
        } else {
            None
        };

        match failure {
            Some(reason) => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                Err(LearningError::StorageUnavailable(format!(
                    "{operation}: {reason}"
                )))
            }
            None => Ok(()),
        }
    }

    fn take_write_budget(&self) -> bool {
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                UNLIMITED => Some(UNLIMITED),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl StoragePort for FaultyStore {
    async fn get_q_value(
        &self,
        agent_type: AgentType,
        state_hash: &str,
        action_hash: &str,
    ) -> Result<Option<f64>> {
        self.gate("get_q_value", false).await?;
        self.inner.get_q_value(agent_type, state_hash, action_hash).await
    }

    async fn upsert_q_value(&self, write: QValueWrite) -> Result<Uuid> {
        self.gate("upsert_q_value", true).await?;
        self.inner.upsert_q_value(write).await
    }

    async fn get_best_action(
        &self,
        agent_type: AgentType,
        state_hash: &str,
    ) -> Result<Option<BestAction>> {
        self.gate("get_best_action", false).await?;
        self.inner.get_best_action(agent_type, state_hash).await
    }

    async fn store_trajectory(&self, trajectory: NewTrajectory) -> Result<Uuid> {
        self.gate("store_trajectory", true).await?;
        self.inner.store_trajectory(trajectory).await
    }

    async fn update_agent_state(&self, stats: AgentLearningStats) -> Result<()> {
        self.gate("update_agent_state", true).await?;
        self.inner.update_agent_state(stats).await
    }

    async fn cleanup_expired(&self) -> Result<HashMap<String, u64>> {
        self.gate("cleanup_expired", true).await?;
        self.inner.cleanup_expired().await
    }
}

#[async_trait]
impl ChaosTestable for FaultyStore {
    async fn health_check(&self) -> ChaosResult<bool> {
        Ok(!self.disconnected.load(Ordering::SeqCst))
    }

    async fn inject_fault(&self, fault: FaultType) -> ChaosResult<()> {
        match fault {
            FaultType::NetworkDisconnect => self.disconnect(),
            FaultType::ReadOnly => self.read_only.store(true, Ordering::SeqCst),
            FaultType::WriteBudget { successful_writes } => {
                self.write_budget.store(successful_writes, Ordering::SeqCst);
            }
            FaultType::LatencyInjection { delay_ms } => {
                self.latency_ms.store(delay_ms, Ordering::SeqCst);
            }
            FaultType::PartialFailure { failure_rate } => {
                if !(failure_rate > 0.0 && failure_rate <= 1.0) {
                    return Err(ChaosError::PreconditionFailed(format!(
                        "failure_rate {failure_rate} outside (0, 1]"
                    )));
                }
                let every = (1.0 / failure_rate).round().max(1.0) as u64;
                self.fail_every.store(every, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn restore(&self) -> ChaosResult<()> {
        self.reconnect();
        self.read_only.store(false, Ordering::SeqCst);
        self.write_budget.store(UNLIMITED, Ordering::SeqCst);
        self.latency_ms.store(0, Ordering::SeqCst);
        self.fail_every.store(0, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(action: &str) -> QValueWrite {
        QValueWrite {
            agent_type: AgentType::ChaosEngineer,
            state_hash: "s".to_string(),
            action_hash: action.to_string(),
            q_value: 1.0,
            state_data: json!({}),
            action_data: json!({}),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_disconnect_and_restore() {
        let store = FaultyStore::new(Arc::new(InMemoryStore::default()));
        assert!(store.health_check().await.unwrap());

        store.inject_fault(FaultType::NetworkDisconnect).await.unwrap();
        assert!(!store.health_check().await.unwrap());
        let err = store
            .get_q_value(AgentType::ChaosEngineer, "s", "a")
            .await
            .unwrap_err();
        assert!(err.is_storage());

        store.restore().await.unwrap();
        assert!(store.upsert_q_value(write("a")).await.is_ok());
        assert_eq!(store.rejected_calls(), 1);
    }

    #[tokio::test]
    async fn test_read_only_allows_reads() {
        let store = FaultyStore::new(Arc::new(InMemoryStore::default()));
        store.upsert_q_value(write("a")).await.unwrap();
        store.inject_fault(FaultType::ReadOnly).await.unwrap();

        assert_eq!(
            store
                .get_q_value(AgentType::ChaosEngineer, "s", "a")
                .await
                .unwrap(),
            Some(1.0)
        );
        assert!(store.upsert_q_value(write("b")).await.is_err());
    }

    #[tokio::test]
    async fn test_write_budget() {
        let store = FaultyStore::new(Arc::new(InMemoryStore::default()));
        store
            .inject_fault(FaultType::WriteBudget { successful_writes: 2 })
            .await
            .unwrap();

        assert!(store.upsert_q_value(write("a")).await.is_ok());
        assert!(store.upsert_q_value(write("b")).await.is_ok());
        assert!(store.upsert_q_value(write("c")).await.is_err());
        assert_eq!(store.inner().q_value_count().await, 2);
    }

    #[tokio::test]
    async fn test_partial_failure_is_deterministic() {
        let store = FaultyStore::new(Arc::new(InMemoryStore::default()));
        store
            .inject_fault(FaultType::PartialFailure { failure_rate: 0.25 })
            .await
            .unwrap();

        let mut failures = 0;
        for _ in 0..20 {
            if store
                .get_q_value(AgentType::ChaosEngineer, "s", "a")
                .await
                .is_err()
            {
                failures += 1;
            }
        }
        assert_eq!(failures, 5);

        let bad = store
            .inject_fault(FaultType::PartialFailure { failure_rate: 0.0 })
            .await;
        assert!(matches!(bad, Err(ChaosError::PreconditionFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_injection() {
        let store = FaultyStore::new(Arc::new(InMemoryStore::default()));
        store
            .inject_fault(FaultType::LatencyInjection { delay_ms: 250 })
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        store
            .get_q_value(AgentType::ChaosEngineer, "s", "a")
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
