//! State, Action, and Reward types for RL, plus the state encoder

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use aqe_core::util::to_hex;
use aqe_core::{AgentType, LearningError, Result};

use crate::features::{common_features, FeatureBag, FeatureExtractor};
use crate::registry::AgentRegistry;

/// Reward value from environment
pub type Reward = f64;

/// A canonical, hashable state.
///
/// Two contexts whose feature bags are equal after bucketing share one
/// `state_hash`, whatever their key order or un-bucketed detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedState {
    /// 64 lowercase hex characters
    pub state_hash: String,
    pub features: FeatureBag,
    pub raw_context: Value,
}

impl EncodedState {
    /// Payload persisted alongside a Q-value
    pub fn state_data(&self) -> Value {
        serde_json::json!({
            "features": self.features,
            "raw_context": self.raw_context,
        })
    }
}

/// Action identifier with its stable hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub action_hash: String,
}

impl Action {
    pub fn new(action_id: impl Into<String>) -> Self {
        let action_id = action_id.into();
        let action_hash = sha256_hex(action_id.as_bytes());
        Self {
            action_id,
            action_hash,
        }
    }

    /// Payload persisted alongside a Q-value
    pub fn action_data(&self) -> Value {
        serde_json::json!({ "action_id": self.action_id })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.action_id)
    }
}

/// Ordered, finite set of actions available to one agent type.
///
/// Order matters: greedy selection breaks ties in favour of the earlier action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSpace {
    actions: Vec<Action>,
}

impl ActionSpace {
    /// Build an action space, rejecting duplicate identifiers.
    pub fn new<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut actions = Vec::new();
        for id in ids {
            let action = Action::new(id);
            if !seen.insert(action.action_id.clone()) {
                return Err(LearningError::Configuration(format!(
                    "Duplicate action id in action space: {}",
                    action.action_id
                )));
            }
            actions.push(action);
        }
        Ok(Self { actions })
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, action_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.action_id == action_id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Turns raw task context into an [`EncodedState`] for one agent type.
#[derive(Clone)]
pub struct StateEncoder {
    agent_type: AgentType,
    extractor: Arc<dyn FeatureExtractor>,
}

impl StateEncoder {
    /// Bind an encoder to a registered agent type.
    pub fn new(agent_type: AgentType, registry: &AgentRegistry) -> Result<Self> {
        let profile = registry.profile(agent_type)?;
        Ok(Self::with_extractor(agent_type, Arc::clone(&profile.extractor)))
    }

    /// Bind an encoder by agent type name, e.g. `"flaky-test-hunter"`.
    pub fn for_name(name: &str, registry: &AgentRegistry) -> Result<Self> {
        Self::new(name.parse()?, registry)
    }

    pub fn with_extractor(agent_type: AgentType, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            agent_type,
            extractor,
        }
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Encode a JSON object context.
    pub fn encode(&self, context: &Value) -> Result<EncodedState> {
        let Value::Object(map) = context else {
            return Err(LearningError::Encoding(format!(
                "task context must be a JSON object, got {}",
                json_kind(context)
            )));
        };

        let mut features = common_features(map);
        features.extend(self.extractor.extract(map));

        let state_hash = hash_features(&features)?;

        Ok(EncodedState {
            state_hash,
            features,
            raw_context: context.clone(),
        })
    }

    /// Encode any serializable context type.
    pub fn encode_serializable<T: Serialize>(&self, context: &T) -> Result<EncodedState> {
        let value = serde_json::to_value(context)
            .map_err(|e| LearningError::Encoding(format!("context is not serializable: {e}")))?;
        self.encode(&value)
    }
}

impl std::fmt::Debug for StateEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEncoder")
            .field("agent_type", &self.agent_type)
            .finish_non_exhaustive()
    }
}

/// SHA-256 over the sorted `(name, value)` tuples of a feature bag.
///
/// Non-primitive values enter the hash as their sorted-key JSON text.
pub fn hash_features(features: &FeatureBag) -> Result<String> {
    let tuples: Vec<(&str, Value)> = features
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::Object(_) | Value::Array(_) => {
                    serde_json::to_string(&canonicalize_json(value)).map(Value::String)
                }
                primitive => Ok(primitive.clone()),
            };
            value.map(|v| (name.as_str(), v))
        })
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| LearningError::Encoding(format!("feature canonicalization failed: {e}")))?;

    let bytes = serde_json::to_vec(&tuples)
        .map_err(|e| LearningError::Encoding(format!("feature serialization failed: {e}")))?;
    Ok(sha256_hex(&bytes))
}

/// Recursively sort object keys; arrays keep their order.
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(child) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize_json(child));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
