//! Local Q-value cache
//!
//! Read-through: a miss asks the store once; present values are cached clean,
//! absent and failed lookups read as 0.0 and are not cached.
//!
//! Write-back: local updates mark entries dirty. Once `sync_interval` updates
//! have accumulated the owner flushes. Only dirty entries are written, in the
//! order they first became dirty. A failed write stops the flush and keeps
//! that entry and every unattempted one dirty for the next attempt.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::{debug, warn};

use aqe_core::LearningError;

use crate::state::{Action, EncodedState};
use crate::storage::StoreClient;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QKey {
    state_hash: String,
    action_hash: String,
}

impl QKey {
    fn new(state_hash: &str, action_hash: &str) -> Self {
        Self {
            state_hash: state_hash.to_string(),
            action_hash: action_hash.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedQ {
    q_value: f64,
    dirty: bool,
    state_data: Value,
    action_data: Value,
}

/// Outcome of one flush attempt
#[derive(Debug, Default)]
pub struct FlushReport {
    pub written: usize,
    pub retained: usize,
    pub error: Option<LearningError>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct QValueCache {
    entries: HashMap<QKey, CachedQ>,
    dirty: VecDeque<QKey>,
    pending_updates: u32,
    sync_interval: u32,
}

impl QValueCache {
    pub fn new(sync_interval: u32) -> Self {
        Self {
            entries: HashMap::new(),
            dirty: VecDeque::new(),
            pending_updates: 0,
            sync_interval: sync_interval.max(1),
        }
    }

    /// Local value only; never touches the store.
    pub fn peek(&self, state_hash: &str, action_hash: &str) -> Option<f64> {
        self.entries
            .get(&QKey::new(state_hash, action_hash))
            .map(|e| e.q_value)
    }

    /// Cached value, or a single store lookup on miss.
    pub async fn get(&mut self, client: &StoreClient, state_hash: &str, action: &Action) -> f64 {
        let key = QKey::new(state_hash, &action.action_hash);
        if let Some(entry) = self.entries.get(&key) {
            return entry.q_value;
        }

        match client.get_q_value(state_hash, &action.action_hash).await {
            Ok(Some(q_value)) => {
                self.entries.insert(
                    key,
                    CachedQ {
                        q_value,
                        dirty: false,
                        state_data: Value::Null,
                        action_data: action.action_data(),
                    },
                );
                q_value
            }
            Ok(None) => 0.0,
            Err(e) => {
                warn!(
                    agent_type = %client.agent_type(),
                    action = %action,
                    error = %e,
                    "Q-value lookup failed, assuming 0.0"
                );
                0.0
            }
        }
    }

    /// Write a value locally and mark it dirty.
    ///
    /// Returns `true` once `sync_interval` updates have accumulated.
    pub fn put(&mut self, state: &EncodedState, action: &Action, q_value: f64) -> bool {
        let key = QKey::new(&state.state_hash, &action.action_hash);
        let entry = self.entries.entry(key.clone()).or_insert_with(|| CachedQ {
            q_value,
            dirty: false,
            state_data: Value::Null,
            action_data: Value::Null,
        });
        entry.q_value = q_value;
        entry.state_data = state.state_data();
        entry.action_data = action.action_data();
        if !entry.dirty {
            entry.dirty = true;
            self.dirty.push_back(key);
        }

        self.pending_updates += 1;
        self.pending_updates >= self.sync_interval
    }

    /// Write every dirty entry to the store and reset the update counter.
    pub async fn flush(&mut self, client: &StoreClient) -> FlushReport {
        self.pending_updates = 0;
        let mut report = FlushReport::default();

        while let Some(key) = self.dirty.pop_front() {
            let Some(entry) = self.entries.get(&key) else {
                continue;
            };
            let result = client
                .upsert_q_value(
                    &key.state_hash,
                    &key.action_hash,
                    entry.q_value,
                    entry.state_data.clone(),
                    entry.action_data.clone(),
                )
                .await;

            match result {
                Ok(_) => {
                    if let Some(entry) = self.entries.get_mut(&key) {
                        entry.dirty = false;
                    }
                    report.written += 1;
                }
                Err(e) => {
                    self.dirty.push_front(key);
                    report.error = Some(e);
                    break;
                }
            }
        }

        report.retained = self.dirty.len();
        debug!(
            written = report.written,
            retained = report.retained,
            "Cache flush finished"
        );
        report
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn pending_updates(&self) -> u32 {
        self.pending_updates
    }

    pub fn sync_interval(&self) -> u32 {
        self.sync_interval
    }
}
