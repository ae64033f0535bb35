//! Agent type registry
//!
//! Each agent type is bound once to its feature extractor, action space and
//! optional reward adjustment. Encoders, reward calculators and learning cores
//! look their profile up here by [`AgentType`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use aqe_core::{AgentType, LearningError, Result};

use crate::features::{default_extractor, FeatureExtractor};
use crate::reward::{default_adjustment, RewardAdjustment};
use crate::state::ActionSpace;

/// Everything the engine needs to know about one agent type
#[derive(Clone)]
pub struct AgentProfile {
    pub agent_type: AgentType,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub action_space: ActionSpace,
    pub reward_adjustment: Option<RewardAdjustment>,
}

impl AgentProfile {
    pub fn new(agent_type: AgentType, action_space: ActionSpace) -> Self {
        Self {
            agent_type,
            extractor: default_extractor(agent_type),
            action_space,
            reward_adjustment: default_adjustment(agent_type),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_reward_adjustment(mut self, adjustment: Option<RewardAdjustment>) -> Self {
        self.reward_adjustment = adjustment;
        self
    }

    /// Profile with the built-in extractor, actions and adjustment
    pub fn builtin(agent_type: AgentType) -> Result<Self> {
        let action_space = ActionSpace::new(default_actions(agent_type).iter().copied())?;
        Ok(Self::new(agent_type, action_space))
    }
}

impl std::fmt::Debug for AgentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentProfile")
            .field("agent_type", &self.agent_type)
            .field("action_space", &self.action_space)
            .field("reward_adjustment", &self.reward_adjustment.is_some())
            .finish_non_exhaustive()
    }
}

/// Lookup table from agent type to profile
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    profiles: HashMap<AgentType, AgentProfile>,
}

impl AgentRegistry {
    /// A registry with no agent types; every lookup fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with all built-in agent types registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for agent_type in AgentType::ALL {
            // Built-in action lists are static and duplicate-free
            if let Ok(profile) = AgentProfile::builtin(agent_type) {
                registry.register(profile);
            }
        }
        debug!(count = registry.len(), "Registered built-in agent profiles");
        registry
    }

    /// Register or replace a profile; returns the previous one.
    pub fn register(&mut self, profile: AgentProfile) -> Option<AgentProfile> {
        self.profiles.insert(profile.agent_type, profile)
    }

    pub fn profile(&self, agent_type: AgentType) -> Result<&AgentProfile> {
        self.profiles.get(&agent_type).ok_or_else(|| {
            LearningError::Configuration(format!("Agent type not registered: {agent_type}"))
        })
    }

    pub fn contains(&self, agent_type: AgentType) -> bool {
        self.profiles.contains_key(&agent_type)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Built-in action identifiers, in tie-break order.
pub fn default_actions(agent_type: AgentType) -> &'static [&'static str] {
    match agent_type {
        AgentType::TestGenerator => &[
            "unit_tests",
            "integration_tests",
            "property_based",
            "boundary_value",
            "mutation_guided",
        ],
        AgentType::TestExecutor => &["sequential", "parallel", "sharded", "fail_fast"],
        AgentType::CoverageAnalyzer => &[
            "line_coverage",
            "branch_coverage",
            "gap_prioritized",
            "risk_weighted",
        ],
        AgentType::QualityGate => &["strict", "balanced", "lenient"],
        AgentType::QualityAnalyzer => &[
            "static_analysis",
            "code_smells",
            "maintainability",
            "duplication",
        ],
        AgentType::PerformanceTester => &["load_test", "stress_test", "spike_test", "soak_test"],
        AgentType::SecurityScanner => &[
            "sast",
            "dependency_audit",
            "secret_scan",
            "dast",
        ],
        AgentType::RequirementsValidator => &[
            "bdd_scenarios",
            "acceptance_criteria",
            "traceability",
        ],
        AgentType::ProductionIntelligence => &[
            "incident_replay",
            "anomaly_detection",
            "usage_analytics",
        ],
        AgentType::FleetCommander => &[
            "scale_up",
            "scale_down",
            "rebalance",
            "hold",
        ],
        AgentType::DeploymentReadiness => &["go", "canary", "hold", "rollback"],
        AgentType::RegressionRiskAnalyzer => &[
            "full_suite",
            "impacted_only",
            "risk_ranked",
            "smoke_only",
        ],
        AgentType::TestDataArchitect => &[
            "synthetic",
            "anonymized_production",
            "minimal_fixture",
        ],
        AgentType::ApiContractValidator => &[
            "schema_diff",
            "consumer_driven",
            "backward_compat",
        ],
        AgentType::FlakyTestHunter => &[
            "rerun_analysis",
            "statistical_detection",
            "quarantine",
            "root_cause_trace",
        ],
        AgentType::VisualTester => &[
            "pixel_diff",
            "perceptual_diff",
            "layout_check",
        ],
        AgentType::ChaosEngineer => &[
            "latency_injection",
            "fault_injection",
            "resource_exhaustion",
            "network_partition",
        ],
        AgentType::CodeComplexity => &[
            "cyclomatic",
            "cognitive",
            "hotspot_ranking",
        ],
    }
}
