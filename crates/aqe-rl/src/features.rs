//! Feature extraction and bucketing
//!
//! Every agent type maps raw task context to a small bag of coarse features.
//! Bucketing is what makes learning generalize: two contexts that differ only
//! inside a bucket land on the same state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use aqe_core::AgentType;

/// Ordered feature name -> bucketed value
pub type FeatureBag = BTreeMap<String, Value>;

/// Raw task context as supplied by the agent
pub type Context = Map<String, Value>;

/// Pure mapping from raw context to agent-specific features
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, context: &Context) -> FeatureBag;
}

/// How a raw value is quantized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// 0-100 percentage, floored to a multiple of 10
    Percent,
    /// 0-1 ratio, mapped to its decile index 0-10
    Ratio,
    /// Non-negative count, capped and floored to a multiple of `width`.
    /// Arrays are counted by length.
    Count { width: u32, cap: u32 },
    /// Boolean pass-through
    Flag,
    /// Literal string value
    Text,
}

impl Bucket {
    /// Quantize one value. Values of an unexpected shape are kept verbatim and
    /// canonicalized later by the encoder.
    pub fn apply(self, value: &Value) -> Value {
        match self {
            Bucket::Percent => match value.as_f64() {
                Some(p) => Value::from(((p.clamp(0.0, 100.0) / 10.0).floor() as i64) * 10),
                None => value.clone(),
            },
            Bucket::Ratio => match value.as_f64() {
                Some(r) => Value::from((r.clamp(0.0, 1.0) * 10.0).floor() as i64),
                None => value.clone(),
            },
            Bucket::Count { width, cap } => match count_of(value) {
                Some(n) => {
                    let width = f64::from(width.max(1));
                    let n = n.clamp(0.0, f64::from(cap));
                    Value::from(((n / width).floor() * width) as i64)
                }
                None => value.clone(),
            },
            Bucket::Flag => match value {
                Value::Bool(b) => Value::Bool(*b),
                Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|v| v != 0.0)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
                other => other.clone(),
            },
            Bucket::Text => match value {
                Value::String(s) => Value::String(s.clone()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => other.clone(),
            },
        }
    }
}

fn count_of(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) => Some(items.len() as f64),
        other => other.as_f64(),
    }
}

/// One context key and how to bucket it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRule {
    pub key: &'static str,
    pub bucket: Bucket,
}

const fn rule(key: &'static str, bucket: Bucket) -> FeatureRule {
    FeatureRule { key, bucket }
}

const fn count(key: &'static str, width: u32, cap: u32) -> FeatureRule {
    rule(key, Bucket::Count { width, cap })
}

/// Table-driven extractor: applies each rule whose key is present
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<FeatureRule>,
}

impl RuleTable {
    pub fn new(rules: impl Into<Vec<FeatureRule>>) -> Self {
        Self { rules: rules.into() }
    }

    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }
}

impl FeatureExtractor for RuleTable {
    fn extract(&self, context: &Context) -> FeatureBag {
        self.rules
            .iter()
            .filter_map(|r| {
                context
                    .get(r.key)
                    .filter(|v| !v.is_null())
                    .map(|v| (r.key.to_string(), r.bucket.apply(v)))
            })
            .collect()
    }
}

// ============================================================================
// Common features
// ============================================================================

/// Coarse size/complexity class shared by every agent type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityClass {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplexityClass::Simple => "simple",
            ComplexityClass::Moderate => "moderate",
            ComplexityClass::Complex => "complex",
        }
    }

    /// Weighted score over code size, cyclomatic complexity, dependencies and tests.
    pub fn score(context: &Context) -> f64 {
        let norm = |key: &str, scale: f64| -> f64 {
            let raw = context.get(key).and_then(count_of).unwrap_or(0.0);
            (raw.max(0.0) / scale).min(1.0)
        };
        0.4 * norm("lines_of_code", 1000.0)
            + 0.3 * norm("cyclomatic_complexity", 20.0)
            + 0.2 * norm("dependency_count", 20.0)
            + 0.1 * norm("test_count", 100.0)
    }

    pub fn classify(context: &Context) -> Self {
        let score = Self::score(context);
        if score < 0.3 {
            ComplexityClass::Simple
        } else if score < 0.6 {
            ComplexityClass::Moderate
        } else {
            ComplexityClass::Complex
        }
    }
}

/// Features every state carries regardless of agent type
pub fn common_features(context: &Context) -> FeatureBag {
    let task_type = match context.get("task_type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    };

    let mut bag = FeatureBag::new();
    bag.insert("task_type".to_string(), Value::String(task_type));
    bag.insert(
        "complexity".to_string(),
        Value::String(ComplexityClass::classify(context).as_str().to_string()),
    );
    bag
}

// ============================================================================
// Per-agent-type rule tables
// ============================================================================

const TEST_GENERATOR: &[FeatureRule] = &[
    rule("coverage", Bucket::Percent),
    rule("target_coverage", Bucket::Percent),
    rule("framework", Bucket::Text),
    rule("language", Bucket::Text),
    rule("test_type", Bucket::Text),
    count("existing_tests", 10, 200),
    count("functions_count", 5, 100),
    rule("has_mocks", Bucket::Flag),
];

const TEST_EXECUTOR: &[FeatureRule] = &[
    count("test_count", 50, 1000),
    rule("parallel", Bucket::Flag),
    rule("framework", Bucket::Text),
    count("avg_test_duration_ms", 100, 5000),
    rule("retry_enabled", Bucket::Flag),
    rule("failure_rate", Bucket::Ratio),
];

const COVERAGE_ANALYZER: &[FeatureRule] = &[
    rule("coverage", Bucket::Percent),
    rule("branch_coverage", Bucket::Percent),
    count("uncovered_lines", 50, 1000),
    count("file_count", 10, 200),
    rule("language", Bucket::Text),
];

const QUALITY_GATE: &[FeatureRule] = &[
    rule("quality_score", Bucket::Percent),
    rule("coverage", Bucket::Percent),
    count("critical_issues", 1, 10),
    count("blocking_issues", 1, 10),
    rule("environment", Bucket::Text),
    rule("strict_mode", Bucket::Flag),
];

const QUALITY_ANALYZER: &[FeatureRule] = &[
    rule("quality_score", Bucket::Percent),
    count("code_smells", 5, 100),
    rule("duplication", Bucket::Percent),
    rule("maintainability_index", Bucket::Percent),
    rule("language", Bucket::Text),
];

const PERFORMANCE_TESTER: &[FeatureRule] = &[
    rule("load_level", Bucket::Text),
    count("target_rps", 100, 10_000),
    count("p95_latency_ms", 50, 2000),
    rule("error_rate", Bucket::Ratio),
    count("test_duration_s", 60, 3600),
];

const SECURITY_SCANNER: &[FeatureRule] = &[
    rule("scan_type", Bucket::Text),
    count("vulnerabilities", 1, 20),
    count("critical_vulnerabilities", 1, 10),
    count("dependency_count", 10, 500),
    rule("has_secrets", Bucket::Flag),
    rule("compliance_framework", Bucket::Text),
];

const REQUIREMENTS_VALIDATOR: &[FeatureRule] = &[
    count("requirement_count", 5, 100),
    rule("ambiguity_score", Bucket::Ratio),
    rule("testability_score", Bucket::Ratio),
    rule("format", Bucket::Text),
    rule("has_acceptance_criteria", Bucket::Flag),
];

const PRODUCTION_INTELLIGENCE: &[FeatureRule] = &[
    count("incident_count", 1, 20),
    rule("error_rate", Bucket::Ratio),
    count("user_sessions", 1000, 100_000),
    rule("severity", Bucket::Text),
    rule("anomaly_detected", Bucket::Flag),
];

const FLEET_COMMANDER: &[FeatureRule] = &[
    count("active_agents", 2, 50),
    count("queue_depth", 5, 200),
    count("pending_tasks", 5, 200),
    rule("resource_utilization", Bucket::Percent),
    rule("strategy", Bucket::Text),
];

const DEPLOYMENT_READINESS: &[FeatureRule] = &[
    rule("risk_score", Bucket::Percent),
    rule("coverage", Bucket::Percent),
    count("failed_checks", 1, 20),
    rule("environment", Bucket::Text),
    rule("rollback_available", Bucket::Flag),
    count("change_size", 100, 5000),
];

const REGRESSION_RISK_ANALYZER: &[FeatureRule] = &[
    count("changed_files", 5, 200),
    count("changed_lines", 100, 5000),
    rule("risk_score", Bucket::Percent),
    rule("critical_path_touched", Bucket::Flag),
    rule("historical_failure_rate", Bucket::Ratio),
];

const TEST_DATA_ARCHITECT: &[FeatureRule] = &[
    count("record_count", 1000, 1_000_000),
    rule("schema_complexity", Bucket::Text),
    rule("data_format", Bucket::Text),
    rule("requires_anonymization", Bucket::Flag),
    count("relationship_count", 5, 100),
];

const API_CONTRACT_VALIDATOR: &[FeatureRule] = &[
    count("endpoint_count", 5, 200),
    rule("spec_format", Bucket::Text),
    count("breaking_changes", 1, 20),
    rule("versioned", Bucket::Flag),
    rule("schema_coverage", Bucket::Percent),
];

const FLAKY_TEST_HUNTER: &[FeatureRule] = &[
    rule("flakiness_rate", Bucket::Ratio),
    count("test_runs", 10, 500),
    count("failure_count", 5, 100),
    count("timing_variance_ms", 100, 5000),
    rule("has_async", Bucket::Flag),
    rule("framework", Bucket::Text),
];

const VISUAL_TESTER: &[FeatureRule] = &[
    count("screenshot_count", 10, 500),
    count("viewport_count", 1, 10),
    rule("diff_threshold", Bucket::Ratio),
    rule("browser", Bucket::Text),
    rule("baseline_exists", Bucket::Flag),
];

const CHAOS_ENGINEER: &[FeatureRule] = &[
    rule("experiment_type", Bucket::Text),
    rule("blast_radius", Bucket::Text),
    count("target_services", 1, 20),
    rule("steady_state_defined", Bucket::Flag),
    rule("failure_injection_rate", Bucket::Ratio),
];

const CODE_COMPLEXITY: &[FeatureRule] = &[
    count("cyclomatic_complexity", 5, 50),
    count("cognitive_complexity", 5, 100),
    count("function_count", 10, 500),
    count("nesting_depth", 1, 10),
    rule("language", Bucket::Text),
];

/// Built-in rule table for an agent type
pub fn default_rules(agent_type: AgentType) -> &'static [FeatureRule] {
    match agent_type {
        AgentType::TestGenerator => TEST_GENERATOR,
        AgentType::TestExecutor => TEST_EXECUTOR,
        AgentType::CoverageAnalyzer => COVERAGE_ANALYZER,
        AgentType::QualityGate => QUALITY_GATE,
        AgentType::QualityAnalyzer => QUALITY_ANALYZER,
        AgentType::PerformanceTester => PERFORMANCE_TESTER,
        AgentType::SecurityScanner => SECURITY_SCANNER,
        AgentType::RequirementsValidator => REQUIREMENTS_VALIDATOR,
        AgentType::ProductionIntelligence => PRODUCTION_INTELLIGENCE,
        AgentType::FleetCommander => FLEET_COMMANDER,
        AgentType::DeploymentReadiness => DEPLOYMENT_READINESS,
        AgentType::RegressionRiskAnalyzer => REGRESSION_RISK_ANALYZER,
        AgentType::TestDataArchitect => TEST_DATA_ARCHITECT,
        AgentType::ApiContractValidator => API_CONTRACT_VALIDATOR,
        AgentType::FlakyTestHunter => FLAKY_TEST_HUNTER,
        AgentType::VisualTester => VISUAL_TESTER,
        AgentType::ChaosEngineer => CHAOS_ENGINEER,
        AgentType::CodeComplexity => CODE_COMPLEXITY,
    }
}

pub fn default_extractor(agent_type: AgentType) -> Arc<dyn FeatureExtractor> {
    Arc::new(RuleTable::new(default_rules(agent_type)))
}
