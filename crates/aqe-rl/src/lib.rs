//! AQE RL - Tabular Q-learning engine for the agent fleet
//!
//! This crate turns task context into canonical states, scores executed
//! actions with a multi-objective reward, and learns Q-values that are
//! cached locally and synced to a shared durable store.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]

pub mod algorithm;
pub mod cache;
pub mod config;
pub mod engine;
pub mod features;
pub mod memory_store;
pub mod registry;
pub mod retention;
pub mod reward;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod trajectory;

pub use algorithm::{LearningStats, QLearningCore};
pub use cache::{FlushReport, QValueCache};
pub use config::{Config, ExplorationPolicy, LearningConfig, LogConfig, RewardWeights};
pub use engine::{ActionExecutor, EpisodeSummary, ExecutionOutcome, StepRecord};
pub use features::{Bucket, FeatureBag, FeatureExtractor, FeatureRule, RuleTable};
pub use memory_store::{InMemoryStore, StoreCalls};
pub use registry::{AgentProfile, AgentRegistry};
pub use reward::{
    clamp_reward, OutcomeMetadata, RewardAdjustment, RewardBreakdown, RewardCalculator,
    RewardThresholds,
};
pub use state::{Action, ActionSpace, EncodedState, Reward, StateEncoder};
pub use storage::{
    AgentLearningStats, BestAction, NewTrajectory, QEntry, QValueWrite, StoragePort, StoreClient,
    TrajectoryRecord,
};
pub use trajectory::TrajectoryBuilder;
