//! Graceful Degradation Tests
//!
//! Learning must keep working when the store misbehaves:
//! - Selection and updates fall back to local values
//! - Episodes complete and report the host task's own outcome
//! - Unsynced values survive failed flushes and land once the store returns

use std::sync::Arc;

use aqe_core::{AgentType, Result};
use aqe_rl::{AgentRegistry, InMemoryStore, LearningConfig, QLearningCore};

use crate::faulty_store::FaultyStore;

/// A core backed by a fault-injecting store
pub fn faulty_core(
    agent_type: AgentType,
    config: LearningConfig,
) -> Result<(QLearningCore, Arc<FaultyStore>)> {
    let store = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::default())));
    let core = QLearningCore::new(
        agent_type,
        &AgentRegistry::with_defaults(),
        config,
        store.clone(),
    )?;
    Ok((core, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChaosMetrics, ChaosTestable, FaultType};
    use aqe_core::{LearningError, LearningStatus};
    use aqe_rl::{Action, ExecutionOutcome};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn one_step_success(_action: Action, context: Value) -> anyhow::Result<ExecutionOutcome> {
        let mut next = context;
        next["coverage"] = json!(95);
        Ok(ExecutionOutcome::success(next).done())
    }

    fn config(sync_interval: u32) -> LearningConfig {
        LearningConfig {
            sync_interval,
            seed: Some(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_selection_falls_back_when_store_down() {
        let (mut core, store) = faulty_core(AgentType::TestExecutor, config(10)).unwrap();
        store.inject_fault(FaultType::NetworkDisconnect).await.unwrap();

        let action = core
            .select_action(&json!({"task_type": "run"}), false)
            .await
            .unwrap();
        assert_eq!(action.action_id, "sequential");
        assert!(store.rejected_calls() > 0);
    }

    #[tokio::test]
    async fn test_updates_continue_when_store_down() {
        let (mut core, store) = faulty_core(AgentType::TestExecutor, config(1)).unwrap();
        store.inject_fault(FaultType::NetworkDisconnect).await.unwrap();

        let context = json!({"task_type": "run"});
        let action = core.action_space().actions()[0].clone();
        let first = core
            .update_q_value(&context, &action, 10.0, None, true)
            .await
            .unwrap();
        let second = core
            .update_q_value(&context, &action, 10.0, None, true)
            .await
            .unwrap();

        assert!((first - 1.0).abs() < 1e-9);
        assert!((second - 1.9).abs() < 1e-9);
        assert_eq!(core.stats().failed_flushes, 2);
        assert_eq!(core.agent_learning_stats().status, LearningStatus::Degraded);
        assert_eq!(store.inner().q_value_count().await, 0);
    }

    #[tokio::test]
    async fn test_retained_values_sync_after_recovery() {
        let (mut core, store) = faulty_core(AgentType::TestExecutor, config(100)).unwrap();
        let action = core.action_space().actions()[1].clone();
        for i in 0..3 {
            let context = json!({"task_type": format!("run-{i}")});
            core.update_q_value(&context, &action, 5.0, None, true)
                .await
                .unwrap();
        }

        store.inject_fault(FaultType::NetworkDisconnect).await.unwrap();
        let err = core.flush().await.unwrap_err();
        assert!(matches!(err, LearningError::StorageUnavailable(_)));
        assert_eq!(core.params()["dirty_entries"], 3);

        store.restore().await.unwrap();
        assert_eq!(core.flush().await.unwrap(), 3);
        assert_eq!(core.params()["dirty_entries"], 0);
        assert_eq!(store.inner().q_value_count().await, 3);

        let entries = store.inner().entries_for(AgentType::TestExecutor).await;
        assert!(entries.iter().all(|e| e.visit_count == 1));
        assert!(entries.iter().all(|e| (e.q_value - 0.5).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_flush_stops_at_first_failed_write() {
        let (mut core, store) = faulty_core(AgentType::TestExecutor, config(100)).unwrap();
        let action = core.action_space().actions()[0].clone();
        for i in 0..4 {
            let context = json!({"task_type": format!("batch-{i}")});
            core.update_q_value(&context, &action, 1.0, None, true)
                .await
                .unwrap();
        }

        store
            .inject_fault(FaultType::WriteBudget { successful_writes: 1 })
            .await
            .unwrap();
        assert!(core.flush().await.is_err());
        assert_eq!(store.inner().q_value_count().await, 1);
        assert_eq!(core.params()["dirty_entries"], 3);
        // One rejected write; the remaining entries were never attempted
        assert_eq!(store.rejected_calls(), 1);

        store.restore().await.unwrap();
        assert_eq!(core.flush().await.unwrap(), 3);
        assert_eq!(store.inner().q_value_count().await, 4);
    }

    #[tokio::test]
    async fn test_episode_succeeds_without_store() {
        let (mut core, store) = faulty_core(AgentType::CoverageAnalyzer, config(1)).unwrap();
        store.inject_fault(FaultType::NetworkDisconnect).await.unwrap();

        let summary = core
            .execute_learning_episode(json!({"coverage": 40}), &one_step_success, 5)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.steps.len(), 1);
        assert!(summary.trajectory_id.is_none());
        assert!(store.inner().trajectories().await.is_empty());
        assert_eq!(core.stats().total_tasks, 1);
    }

    #[tokio::test]
    async fn test_read_only_store_still_learns_locally() {
        let (mut core, store) = faulty_core(AgentType::QualityGate, config(1)).unwrap();
        store.inject_fault(FaultType::ReadOnly).await.unwrap();

        let mut metrics = ChaosMetrics {
            faults_injected: 1,
            ..Default::default()
        };
        for _ in 0..10 {
            metrics.requests_during_chaos += 1;
            if let Ok(summary) = core
                .execute_learning_episode(json!({"task_type": "gate"}), &one_step_success, 1)
                .await
            {
                if summary.success {
                    metrics.successful_requests += 1;
                }
            }
        }
        assert_eq!(metrics.success_rate(), 1.0);
        assert_eq!(core.stats().q_updates, 10);
        assert_eq!(store.inner().q_value_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_does_not_break_episodes() {
        let (mut core, store) = faulty_core(AgentType::FleetCommander, config(1)).unwrap();
        store
            .inject_fault(FaultType::LatencyInjection { delay_ms: 200 })
            .await
            .unwrap();

        let summary = core
            .execute_learning_episode(json!({"task_type": "scale"}), &one_step_success, 3)
            .await
            .unwrap();
        assert!(summary.success);
        assert!(summary.trajectory_id.is_some());
    }

    #[tokio::test]
    async fn test_recovery_is_observed() {
        let (mut core, store) = faulty_core(AgentType::TestGenerator, config(1)).unwrap();
        let mut metrics = ChaosMetrics::default();
        let action = core.action_space().actions()[0].clone();
        let context = json!({"task_type": "gen"});

        store.inject_fault(FaultType::NetworkDisconnect).await.unwrap();
        metrics.faults_injected += 1;
        core.update_q_value(&context, &action, 1.0, None, true)
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        store.restore().await.unwrap();
        core.update_q_value(&context, &action, 1.0, None, true)
            .await
            .unwrap();

        if core.agent_learning_stats().status == LearningStatus::Degraded {
            metrics.recoveries_failed += 1;
        } else {
            metrics.recoveries_successful += 1;
            metrics
                .recovery_times_ms
                .push(started.elapsed().as_millis() as u64);
        }

        assert_eq!(metrics.recoveries_successful, 1);
        let limit = Duration::from_secs(5).as_millis() as f64;
        assert!(metrics.avg_recovery_time_ms().unwrap_or(f64::MAX) < limit);
        assert_eq!(store.inner().q_value_count().await, 1);
    }
}
