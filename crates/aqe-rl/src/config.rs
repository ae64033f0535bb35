//! Configuration for the learning engine
//!
//! Hyperparameters are validated eagerly: a [`LearningConfig`] that passes
//! [`LearningConfig::validate`] can be handed to the core without further
//! checks.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use aqe_core::LearningError;

/// Tolerance on the reward-weight sum
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub learning: LearningConfig,
    pub log: LogConfig,
}

/// How epsilon moves after each step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationPolicy {
    /// `epsilon = max(min, epsilon * decay)`
    #[default]
    Exponential,
    /// Explore more after losses, less after strong wins
    RewardBased,
}

/// Q-learning hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearningConfig {
    /// Alpha, in (0, 1]
    pub learning_rate: f64,

    /// Gamma, in [0, 1)
    pub discount_factor: f64,

    pub initial_exploration_rate: f64,
    pub exploration_decay: f64,
    pub min_exploration_rate: f64,
    pub max_exploration_rate: f64,
    pub exploration_policy: ExplorationPolicy,

    /// Dirty cache writes between flushes to the store
    pub sync_interval: u32,

    pub reward_weights: RewardWeights,

    /// Retention of Q-values and trajectories
    pub expiry_ttl_seconds: u64,

    /// Fixed RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            initial_exploration_rate: 0.3,
            exploration_decay: 0.995,
            min_exploration_rate: 0.01,
            max_exploration_rate: 1.0,
            exploration_policy: ExplorationPolicy::Exponential,
            sync_interval: 10,
            reward_weights: RewardWeights::default(),
            expiry_ttl_seconds: 30 * 24 * 60 * 60,
            seed: None,
        }
    }
}

impl LearningConfig {
    /// Check every hyperparameter against its allowed range.
    pub fn validate(&self) -> aqe_core::Result<()> {
        // Written as negated ranges so NaN is rejected too.
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid("learning_rate", self.learning_rate, "(0, 1]"));
        }
        if !(self.discount_factor >= 0.0 && self.discount_factor < 1.0) {
            return Err(invalid("discount_factor", self.discount_factor, "[0, 1)"));
        }
        for (name, value) in [
            ("initial_exploration_rate", self.initial_exploration_rate),
            ("min_exploration_rate", self.min_exploration_rate),
            ("max_exploration_rate", self.max_exploration_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, value, "[0, 1]"));
            }
        }
        if !(self.exploration_decay > 0.0 && self.exploration_decay <= 1.0) {
            return Err(invalid("exploration_decay", self.exploration_decay, "(0, 1]"));
        }
        if self.min_exploration_rate > self.max_exploration_rate {
            return Err(LearningError::Configuration(format!(
                "min_exploration_rate {} exceeds max_exploration_rate {}",
                self.min_exploration_rate, self.max_exploration_rate
            )));
        }
        if self.initial_exploration_rate < self.min_exploration_rate
            || self.initial_exploration_rate > self.max_exploration_rate
        {
            return Err(LearningError::Configuration(format!(
                "initial_exploration_rate {} outside [{}, {}]",
                self.initial_exploration_rate, self.min_exploration_rate, self.max_exploration_rate
            )));
        }
        if self.sync_interval == 0 {
            return Err(LearningError::Configuration(
                "sync_interval must be a positive integer".to_string(),
            ));
        }
        if self.expiry_ttl_seconds == 0 {
            return Err(LearningError::Configuration(
                "expiry_ttl_seconds must be positive".to_string(),
            ));
        }
        self.reward_weights.validate()
    }

    pub fn expiry_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.expiry_ttl_seconds).unwrap_or(i64::MAX))
    }
}

fn invalid(name: &str, value: f64, range: &str) -> LearningError {
    LearningError::Configuration(format!("{name} = {value} is outside {range}"))
}

/// Weights of the five reward components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardWeights {
    pub coverage: f64,
    pub quality: f64,
    pub time: f64,
    pub pattern: f64,
    pub cost: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            coverage: 0.30,
            quality: 0.25,
            time: 0.20,
            pattern: 0.15,
            cost: 0.10,
        }
    }
}

impl RewardWeights {
    pub fn sum(&self) -> f64 {
        self.coverage + self.quality + self.time + self.pattern + self.cost
    }

    pub fn validate(&self) -> aqe_core::Result<()> {
        for (name, value) in [
            ("coverage", self.coverage),
            ("quality", self.quality),
            ("time", self.time),
            ("pattern", self.pattern),
            ("cost", self.cost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LearningError::Configuration(format!(
                    "reward weight {name} = {value} must be a non-negative number"
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(LearningError::Configuration(format!(
                "reward weights sum to {sum:.3}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// Logging settings consumed by [`crate::telemetry::init_tracing`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        Self::build(Self::find_config_file())
    }

    /// Load configuration from an explicit file, still honouring the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(Some(path.as_ref().to_path_buf()))
    }

    fn build(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

        if let Some(path) = &config_path {
            tracing::info!("Loading config from: {:?}", path);
            builder = builder.add_source(File::from(path.clone()).required(false));
        } else {
            tracing::info!("No config file found, using defaults");
        }

        // Environment variables with AQE_ prefix, e.g. AQE_LEARNING__SYNC_INTERVAL=20
        builder = builder.add_source(
            Environment::with_prefix("AQE")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .learning
            .validate()
            .context("Invalid learning configuration")?;

        Ok(config)
    }

    /// Find the configuration file
    fn find_config_file() -> Option<PathBuf> {
        // Check in order: AQE_CONFIG env, ./aqe.toml, ~/.config/aqe/aqe.toml
        if let Ok(path) = std::env::var("AQE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from("aqe.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("aqe").join("aqe.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }
}
