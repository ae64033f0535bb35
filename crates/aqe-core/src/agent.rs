//! Agent types and instance identifiers

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LearningError;

/// Unique identifier for one running agent instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentInstanceId(pub Uuid);

impl AgentInstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed set of agent types that can learn.
///
/// Names are kebab-case on the wire (`"flaky-test-hunter"`). Unknown names are
/// rejected rather than mapped to a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    TestGenerator,
    TestExecutor,
    CoverageAnalyzer,
    QualityGate,
    QualityAnalyzer,
    PerformanceTester,
    SecurityScanner,
    RequirementsValidator,
    ProductionIntelligence,
    FleetCommander,
    DeploymentReadiness,
    RegressionRiskAnalyzer,
    TestDataArchitect,
    ApiContractValidator,
    FlakyTestHunter,
    VisualTester,
    ChaosEngineer,
    CodeComplexity,
}

impl AgentType {
    /// Every supported agent type, in registry order
    pub const ALL: [AgentType; 18] = [
        AgentType::TestGenerator,
        AgentType::TestExecutor,
        AgentType::CoverageAnalyzer,
        AgentType::QualityGate,
        AgentType::QualityAnalyzer,
        AgentType::PerformanceTester,
        AgentType::SecurityScanner,
        AgentType::RequirementsValidator,
        AgentType::ProductionIntelligence,
        AgentType::FleetCommander,
        AgentType::DeploymentReadiness,
        AgentType::RegressionRiskAnalyzer,
        AgentType::TestDataArchitect,
        AgentType::ApiContractValidator,
        AgentType::FlakyTestHunter,
        AgentType::VisualTester,
        AgentType::ChaosEngineer,
        AgentType::CodeComplexity,
    ];

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::TestGenerator => "test-generator",
            AgentType::TestExecutor => "test-executor",
            AgentType::CoverageAnalyzer => "coverage-analyzer",
            AgentType::QualityGate => "quality-gate",
            AgentType::QualityAnalyzer => "quality-analyzer",
            AgentType::PerformanceTester => "performance-tester",
            AgentType::SecurityScanner => "security-scanner",
            AgentType::RequirementsValidator => "requirements-validator",
            AgentType::ProductionIntelligence => "production-intelligence",
            AgentType::FleetCommander => "fleet-commander",
            AgentType::DeploymentReadiness => "deployment-readiness",
            AgentType::RegressionRiskAnalyzer => "regression-risk-analyzer",
            AgentType::TestDataArchitect => "test-data-architect",
            AgentType::ApiContractValidator => "api-contract-validator",
            AgentType::FlakyTestHunter => "flaky-test-hunter",
            AgentType::VisualTester => "visual-tester",
            AgentType::ChaosEngineer => "chaos-engineer",
            AgentType::CodeComplexity => "code-complexity",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        AgentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| LearningError::Configuration(format!("Unsupported agent type: {s}")))
    }
}
