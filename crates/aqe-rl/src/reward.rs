//! Multi-objective reward calculation
//!
//! Scores one executed action from the context before and after it plus the
//! executor's metadata. Each component is bounded on its own; the total is a
//! weighted sum plus flat bonuses and penalties and is not clamped globally
//! (see [`clamp_reward`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aqe_core::AgentType;

use crate::config::RewardWeights;
use crate::state::{Action, Reward};

/// Execution metadata reported by the agent after running an action.
///
/// Every field is optional on the wire; absent numbers contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeMetadata {
    pub task_failed: bool,
    pub timeout: bool,

    pub expected_time_ms: Option<f64>,
    pub actual_time_ms: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub actual_cost: Option<f64>,

    pub bugs_found: u32,
    pub critical_bugs: u32,

    pub pattern_reused: bool,
    pub pattern_succeeded: bool,

    // flaky-test-hunter classification counts
    pub true_positives: Option<u32>,
    pub false_positives: Option<u32>,
    pub true_negatives: Option<u32>,
    pub false_negatives: Option<u32>,

    // test-generator
    pub edge_cases_covered: Option<u32>,
    pub tests_generated: Option<u32>,
    pub target_test_count: Option<u32>,

    // performance-tester
    pub bottlenecks_found: Option<u32>,
}

impl OutcomeMetadata {
    pub fn failed() -> Self {
        Self {
            task_failed: true,
            ..Default::default()
        }
    }
}

/// Penalties, bonuses and component bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardThresholds {
    pub failure_penalty: f64,
    pub timeout_penalty: f64,
    pub coverage_bonus_threshold: f64,
    pub coverage_bonus: f64,
    pub quality_bonus_threshold: f64,
    pub quality_bonus: f64,
    pub coverage_cap: f64,
    pub quality_cap: f64,
    pub time_bounds: (f64, f64),
    pub cost_bounds: (f64, f64),
    pub pattern_success: f64,
    pub pattern_failure: f64,
}

impl Default for RewardThresholds {
    fn default() -> Self {
        Self {
            failure_penalty: -50.0,
            timeout_penalty: -25.0,
            coverage_bonus_threshold: 90.0,
            coverage_bonus: 20.0,
            quality_bonus_threshold: 90.0,
            quality_bonus: 15.0,
            coverage_cap: 100.0,
            quality_cap: 100.0,
            time_bounds: (-50.0, 50.0),
            cost_bounds: (-25.0, 50.0),
            pattern_success: 40.0,
            pattern_failure: -10.0,
        }
    }
}

/// Component scores behind one reward, for logging and inspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub coverage: f64,
    pub quality: f64,
    pub time: f64,
    pub pattern: f64,
    pub cost: f64,
    pub weighted: f64,
    pub flat: f64,
    pub adjustment: f64,
    pub total: f64,
    pub failed: bool,
}

/// Additive, agent-specific reward term evaluated after the base reward
pub type RewardAdjustment = fn(&OutcomeMetadata) -> f64;

/// Weighted multi-objective reward function
#[derive(Debug, Clone)]
pub struct RewardCalculator {
    weights: RewardWeights,
    thresholds: RewardThresholds,
    adjustment: Option<RewardAdjustment>,
}

impl RewardCalculator {
    pub fn new(weights: RewardWeights) -> Self {
        Self {
            weights,
            thresholds: RewardThresholds::default(),
            adjustment: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: RewardThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_adjustment(mut self, adjustment: Option<RewardAdjustment>) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    /// Scalar reward for one transition
    pub fn calculate(
        &self,
        state_before: &Value,
        action: &Action,
        state_after: &Value,
        metadata: &OutcomeMetadata,
    ) -> Reward {
        self.calculate_breakdown(state_before, action, state_after, metadata)
            .total
    }

    pub fn calculate_breakdown(
        &self,
        state_before: &Value,
        _action: &Action,
        state_after: &Value,
        metadata: &OutcomeMetadata,
    ) -> RewardBreakdown {
        let t = &self.thresholds;

        if metadata.task_failed {
            return RewardBreakdown {
                total: t.failure_penalty,
                failed: true,
                ..Default::default()
            };
        }

        let coverage_before = metric(state_before, "coverage");
        let coverage_after = metric(state_after, "coverage");
        let quality_before = metric(state_before, "quality_score");
        let quality_after = metric(state_after, "quality_score");

        let coverage = ((coverage_after - coverage_before) * 10.0).min(t.coverage_cap);
        let quality = ((quality_after - quality_before) * 2.0
            + f64::from(metadata.bugs_found) * 5.0
            + f64::from(metadata.critical_bugs) * 20.0)
            .min(t.quality_cap);
        let time = efficiency(metadata.expected_time_ms, metadata.actual_time_ms, t.time_bounds);
        let cost = efficiency(metadata.estimated_cost, metadata.actual_cost, t.cost_bounds);
        let pattern = match (metadata.pattern_reused, metadata.pattern_succeeded) {
            (true, true) => t.pattern_success,
            (true, false) => t.pattern_failure,
            _ => 0.0,
        };

        let w = &self.weights;
        let weighted = w.coverage * coverage
            + w.quality * quality
            + w.time * time
            + w.pattern * pattern
            + w.cost * cost;

        let mut flat = 0.0;
        if coverage_after >= t.coverage_bonus_threshold {
            flat += t.coverage_bonus;
        }
        if quality_after >= t.quality_bonus_threshold {
            flat += t.quality_bonus;
        }
        if metadata.timeout {
            flat += t.timeout_penalty;
        }

        let adjustment = self.adjustment.map_or(0.0, |adjust| adjust(metadata));

        RewardBreakdown {
            coverage,
            quality,
            time,
            pattern,
            cost,
            weighted,
            flat,
            adjustment,
            total: weighted + flat + adjustment,
            failed: false,
        }
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(RewardWeights::default())
    }
}

/// Hard-bound a reward for consumers that need one.
pub fn clamp_reward(reward: Reward, bound: f64) -> Reward {
    let bound = bound.abs();
    reward.clamp(-bound, bound)
}

fn metric(context: &Value, key: &str) -> f64 {
    context.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// `(planned / actual - 1) * 50`, clamped; zero when either side is unusable.
fn efficiency(planned: Option<f64>, actual: Option<f64>, (lo, hi): (f64, f64)) -> f64 {
    match (planned, actual) {
        (Some(planned), Some(actual)) if actual > 0.0 && planned.is_finite() => {
            ((planned / actual - 1.0) * 50.0).clamp(lo, hi)
        }
        _ => 0.0,
    }
}

// ============================================================================
// Agent-specific adjustments
// ============================================================================

pub fn default_adjustment(agent_type: AgentType) -> Option<RewardAdjustment> {
    match agent_type {
        AgentType::FlakyTestHunter => Some(flakiness_f1_adjustment),
        AgentType::TestGenerator => Some(test_generation_adjustment),
        AgentType::PerformanceTester => Some(bottleneck_adjustment),
        _ => None,
    }
}

/// `(F1 - 0.5) * 60`, so a perfect classifier earns +30 and a useless one -30.
pub fn flakiness_f1_adjustment(metadata: &OutcomeMetadata) -> f64 {
    if metadata.true_positives.is_none()
        && metadata.false_positives.is_none()
        && metadata.false_negatives.is_none()
    {
        return 0.0;
    }
    let tp = f64::from(metadata.true_positives.unwrap_or(0));
    let fp = f64::from(metadata.false_positives.unwrap_or(0));
    let fn_ = f64::from(metadata.false_negatives.unwrap_or(0));

    let denominator = 2.0 * tp + fp + fn_;
    if denominator == 0.0 {
        return 0.0;
    }
    let f1 = 2.0 * tp / denominator;
    (f1 - 0.5) * 60.0
}

/// Edge-case bonus (+2 each, max +20) minus deviation from the target test count (max -20).
pub fn test_generation_adjustment(metadata: &OutcomeMetadata) -> f64 {
    let edge_bonus = metadata
        .edge_cases_covered
        .map_or(0.0, |n| (f64::from(n) * 2.0).min(20.0));

    let deviation_penalty = match (metadata.tests_generated, metadata.target_test_count) {
        (Some(generated), Some(target)) if target > 0 => {
            let deviation = (f64::from(generated) - f64::from(target)).abs() / f64::from(target);
            (deviation * 20.0).min(20.0)
        }
        _ => 0.0,
    };

    edge_bonus - deviation_penalty
}

/// +5 per bottleneck found, max +25
pub fn bottleneck_adjustment(metadata: &OutcomeMetadata) -> f64 {
    metadata
        .bottlenecks_found
        .map_or(0.0, |n| (f64::from(n) * 5.0).min(25.0))
}
