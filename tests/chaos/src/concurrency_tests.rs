//! Concurrency Tests
//!
//! Many cores learning against one shared store:
//! - Concurrent upserts of the same key collapse into one row
//! - Every core's episodes and agent state are recorded
//! - Partial store failures never produce duplicate rows

use std::sync::Arc;

use tokio::task::JoinHandle;

use aqe_core::{AgentType, Result};
use aqe_rl::storage::StoragePort;
use aqe_rl::{AgentRegistry, LearningConfig, QLearningCore};

/// Spawn one core per worker, all sharing `store`, and run `work` on each.
///
/// Cores are returned once their work finishes so callers can inspect them.
pub fn spawn_workers<F, Fut>(
    agent_type: AgentType,
    store: Arc<dyn StoragePort>,
    config: &LearningConfig,
    workers: usize,
    work: F,
) -> Result<Vec<JoinHandle<QLearningCore>>>
where
    F: Fn(QLearningCore, usize) -> Fut,
    Fut: std::future::Future<Output = QLearningCore> + Send + 'static,
{
    let registry = AgentRegistry::with_defaults();
    (0..workers)
        .map(|worker| {
            let core = QLearningCore::new(
                agent_type,
                &registry,
                LearningConfig {
                    seed: config.seed.map(|s| s + worker as u64),
                    ..config.clone()
                },
                store.clone(),
            )?;
            Ok(tokio::spawn(work(core, worker)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faulty_store::FaultyStore;
    use crate::{ChaosConfig, ChaosMetrics, ChaosTestable, FaultType};
    use aqe_rl::{Action, ExecutionOutcome, InMemoryStore};
    use futures::future::join_all;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use tokio::time::timeout;

    fn config() -> LearningConfig {
        LearningConfig {
            sync_interval: 1,
            seed: Some(11),
            ..Default::default()
        }
    }

    async fn join_cores(handles: Vec<JoinHandle<QLearningCore>>) -> Vec<QLearningCore> {
        join_all(handles)
            .await
            .into_iter()
            .map(|r| r.expect("worker panicked"))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_updates_share_one_row() {
        let chaos = ChaosConfig::default();
        let store = Arc::new(InMemoryStore::default());
        let iterations = chaos.iterations;

        let handles = spawn_workers(
            AgentType::PerformanceTester,
            store.clone(),
            &config(),
            chaos.workers,
            move |mut core, _| async move {
                let context = json!({"task_type": "load"});
                let action = core.action_space().actions()[0].clone();
                for _ in 0..iterations {
                    core.update_q_value(&context, &action, 2.0, None, true)
                        .await
                        .unwrap();
                }
                core
            },
        )
        .unwrap();

        let cores = timeout(chaos.test_timeout, join_cores(handles))
            .await
            .expect("workers timed out");

        assert_eq!(store.q_value_count().await, 1);
        let entries = store.entries_for(AgentType::PerformanceTester).await;
        assert_eq!(entries[0].visit_count as usize, chaos.workers * iterations);
        assert!(entries[0].confidence_score <= 1.0);
        assert!(cores.iter().all(|c| c.stats().failed_flushes == 0));
    }

    #[tokio::test]
    async fn test_concurrent_episodes_are_all_recorded() {
        let chaos = ChaosConfig::default();
        let store = Arc::new(InMemoryStore::default());

        let handles = spawn_workers(
            AgentType::FlakyTestHunter,
            store.clone(),
            &config(),
            chaos.workers,
            |mut core, worker| async move {
                let executor = |_action: Action, context: Value| async move {
                    let mut next = context;
                    next["flaky_tests"] = json!(0);
                    Ok::<_, anyhow::Error>(ExecutionOutcome::success(next).done())
                };
                core.execute_learning_episode(
                    json!({"task_type": "hunt", "task_id": format!("task-{worker}")}),
                    &executor,
                    3,
                )
                .await
                .unwrap();
                core
            },
        )
        .unwrap();

        let cores = timeout(chaos.test_timeout, join_cores(handles))
            .await
            .expect("workers timed out");

        let trajectories = store.trajectories().await;
        assert_eq!(trajectories.len(), chaos.workers);
        let task_ids: HashSet<_> = trajectories
            .iter()
            .map(|r| r.trajectory.task_id.clone())
            .collect();
        assert_eq!(task_ids.len(), chaos.workers);

        for core in &cores {
            let stats = store
                .agent_state(AgentType::FlakyTestHunter, core.instance_id())
                .await
                .expect("agent state recorded");
            assert_eq!(stats.total_tasks, 1);
        }
    }

    #[tokio::test]
    async fn test_partial_failure_never_duplicates_rows() {
        let chaos = ChaosConfig::default();
        let inner = Arc::new(InMemoryStore::default());
        let store = Arc::new(FaultyStore::new(inner.clone()));
        store
            .inject_fault(FaultType::PartialFailure { failure_rate: 0.3 })
            .await
            .unwrap();
        let mut metrics = ChaosMetrics {
            faults_injected: 1,
            ..Default::default()
        };
        let iterations = chaos.iterations;

        let handles = spawn_workers(
            AgentType::RegressionRiskAnalyzer,
            store.clone(),
            &config(),
            chaos.workers,
            move |mut core, _| async move {
                let action = core.action_space().actions()[1].clone();
                for i in 0..iterations {
                    let context = json!({"task_type": format!("diff-{}", i % 3)});
                    core.update_q_value(&context, &action, 1.0, None, true)
                        .await
                        .unwrap();
                }
                core
            },
        )
        .unwrap();

        let mut cores = timeout(chaos.test_timeout, join_cores(handles))
            .await
            .expect("workers timed out");
        metrics.requests_during_chaos = (chaos.workers * iterations) as u32;

        store.restore().await.unwrap();
        for core in &mut cores {
            if core.flush().await.is_ok() {
                metrics.recoveries_successful += 1;
            } else {
                metrics.recoveries_failed += 1;
            }
            assert_eq!(core.params()["dirty_entries"], 0);
        }

        assert_eq!(metrics.recoveries_failed, 0);
        assert!(store.rejected_calls() > 0);
        assert_eq!(inner.q_value_count().await, 3);
        let visits: u64 = inner
            .entries_for(AgentType::RegressionRiskAnalyzer)
            .await
            .iter()
            .map(|e| e.visit_count)
            .sum();
        assert!(visits as usize <= chaos.workers * iterations);
    }
}
