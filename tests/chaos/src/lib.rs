//! AQE Chaos Testing Infrastructure
//!
//! Fault injection for the learning engine's storage dependency:
//! - Store disconnection during selection, updates and episode logging
//! - Partial write failures during cache flushes
//! - Latency injection
//! - Many cores sharing one store concurrently

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]

pub mod concurrency_tests;
pub mod degradation_tests;
pub mod faulty_store;

use async_trait::async_trait;
use std::time::Duration;

/// Configuration for chaos tests
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Timeout for test operations
    pub test_timeout: Duration,
    /// Number of concurrent learning cores
    pub workers: usize,
    /// Episodes (or updates) per worker
    pub iterations: usize,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(
                std::env::var("CHAOS_TEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            workers: std::env::var("CHAOS_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
            iterations: std::env::var("CHAOS_ITERATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(25),
        }
    }
}

/// Result type for chaos test operations
pub type ChaosResult<T> = Result<T, ChaosError>;

/// Error type for chaos test failures
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    #[error("Test precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Trait for dependencies that can be chaos-tested
#[async_trait]
pub trait ChaosTestable: Send + Sync {
    /// Check if the dependency is healthy
    async fn health_check(&self) -> ChaosResult<bool>;

    /// Inject a fault
    async fn inject_fault(&self, fault: FaultType) -> ChaosResult<()>;

    /// Remove injected faults and restore normal operation
    async fn restore(&self) -> ChaosResult<()>;
}

/// Types of faults that can be injected
#[derive(Debug, Clone)]
pub enum FaultType {
    /// Every call fails
    NetworkDisconnect,
    /// Reads succeed, every write fails
    ReadOnly,
    /// Allow this many more writes, then fail the rest
    WriteBudget { successful_writes: u64 },
    /// Delay every call
    LatencyInjection { delay_ms: u64 },
    /// Fail a deterministic fraction of calls
    PartialFailure { failure_rate: f64 },
}

/// Metrics collected during chaos tests
#[derive(Debug, Default)]
pub struct ChaosMetrics {
    /// Number of faults injected
    pub faults_injected: u32,
    /// Number of successful recoveries
    pub recoveries_successful: u32,
    /// Number of failed recoveries
    pub recoveries_failed: u32,
    /// Time to recovery in milliseconds
    pub recovery_times_ms: Vec<u64>,
    /// Number of episodes run during chaos
    pub requests_during_chaos: u32,
    /// Number of those episodes that completed
    pub successful_requests: u32,
}

impl ChaosMetrics {
    /// Calculate average recovery time
    pub fn avg_recovery_time_ms(&self) -> Option<f64> {
        if self.recovery_times_ms.is_empty() {
            None
        } else {
            let sum: u64 = self.recovery_times_ms.iter().sum();
            Some(sum as f64 / self.recovery_times_ms.len() as f64)
        }
    }

    /// Calculate success rate during chaos
    pub fn success_rate(&self) -> f64 {
        if self.requests_during_chaos == 0 {
            1.0
        } else {
            f64::from(self.successful_requests) / f64::from(self.requests_during_chaos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chaos_config_defaults() {
        let config = ChaosConfig::default();
        assert_eq!(config.test_timeout, Duration::from_secs(60));
        assert_eq!(config.workers, 8);
        assert_eq!(config.iterations, 25);
    }

    #[test]
    fn test_chaos_metrics_avg_recovery_time() {
        let mut metrics = ChaosMetrics::default();
        assert!(metrics.avg_recovery_time_ms().is_none());

        metrics.recovery_times_ms = vec![100, 200, 300];
        assert_eq!(metrics.avg_recovery_time_ms(), Some(200.0));
    }

    #[test]
    fn test_chaos_metrics_success_rate() {
        let mut metrics = ChaosMetrics::default();
        assert_eq!(metrics.success_rate(), 1.0);

        metrics.requests_during_chaos = 10;
        metrics.successful_requests = 8;
        assert!((metrics.success_rate() - 0.8).abs() < 0.001);
    }
}
