//! Periodic cleanup of expired Q-values and trajectories

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use aqe_core::Result;

use crate::storage::StoragePort;

/// Run one cleanup and log the per-table counts.
pub async fn run_retention_pass(store: &dyn StoragePort) -> Result<HashMap<String, u64>> {
    let deleted = store.cleanup_expired().await?;
    let total: u64 = deleted.values().sum();
    if total > 0 {
        info!(total, tables = ?deleted, "Expired learning data removed");
    }
    Ok(deleted)
}

/// Run [`run_retention_pass`] every `period` until the handle is aborted.
///
/// Failures are logged; the next tick tries again.
pub fn spawn_retention_task(store: Arc<dyn StoragePort>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        loop {
            timer.tick().await;
            if let Err(e) = run_retention_pass(store.as_ref()).await {
                warn!(error = %e, "Retention pass failed");
            }
        }
    })
}
