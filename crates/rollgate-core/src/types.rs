//! Domain types for the rollgate evaluator.
//!
//! These types cross the boundary between the evaluator core and its
//! collaborators (transport layer, CLI, scheduler). All of them are
//! serde-serializable so the transport can project a `Decision` straight
//! to JSON without reshaping.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. Always injected by the caller;
/// the evaluator core never reads a clock itself.
pub type EpochMillis = u64;

/// Name of a tracked metric (e.g. "error_rate", "latency_p95").
pub type MetricName = String;

// ── Samples ───────────────────────────────────────────────────────

/// A single observed metric value. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: MetricName,
    pub value: f64,
    pub observed_at: EpochMillis,
}

impl Sample {
    pub fn new(metric: &str, value: f64, observed_at: EpochMillis) -> Self {
        Self {
            metric: metric.to_string(),
            value,
            observed_at,
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────────

/// Direction of a threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// The metric breaches when its value exceeds the threshold.
    GreaterThan,
    /// The metric breaches when its value drops below the threshold.
    LessThan,
}

impl Comparator {
    /// Whether `value` breaches `threshold` in this direction.
    pub fn breaches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::LessThan => value < threshold,
        }
    }

    /// The comparison symbol, for reason strings.
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => ">",
            Comparator::LessThan => "<",
        }
    }
}

/// A validated per-metric rollback rule.
///
/// Built from raw configuration by `GateConfig::validate`; malformed
/// rules never reach the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub metric: MetricName,
    pub comparator: Comparator,
    pub threshold: f64,
    /// Consecutive breaching samples required before the metric is
    /// considered breached (the anti-flapping gate). At least 1.
    pub consecutive_breaches: u32,
    /// Maximum age of the latest sample before the metric is stale.
    pub staleness_timeout: Duration,
}

/// Projection of a `Rule` echoed in each `Decision` so the transport
/// can render configured thresholds without reaching into config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub comparator: Comparator,
    pub threshold: f64,
    pub consecutive_breaches: u32,
    pub staleness_timeout_secs: u64,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            comparator: rule.comparator,
            threshold: rule.threshold,
            consecutive_breaches: rule.consecutive_breaches,
            staleness_timeout_secs: rule.staleness_timeout.as_secs(),
        }
    }
}

// ── Evaluation results ────────────────────────────────────────────

/// Health state of a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricState {
    /// Fresh data, not breaching (or breaching below the gate).
    Ok,
    /// Fresh data, breaching for at least the required consecutive count.
    Breaching,
    /// No data, or the latest sample is older than the staleness timeout.
    Stale,
}

/// Outcome of evaluating one metric against its rule.
///
/// Recomputed on every evaluation; only the latest result per metric is
/// ever surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub metric: MetricName,
    /// Latest observed value, rounded to two decimals. None when the
    /// window has never seen a sample.
    pub current_value: Option<f64>,
    pub breached: bool,
    pub consecutive_breaches: u32,
    pub state: MetricState,
    pub reason: Option<String>,
}

// ── Decisions ─────────────────────────────────────────────────────

/// A rollback verdict across all tracked metrics.
///
/// Produced fresh on each `evaluate` call and never mutated afterwards.
/// `reasons` preserves rule configuration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub should_rollback: bool,
    pub reasons: Vec<String>,
    pub evaluated_at: EpochMillis,
    pub per_metric: BTreeMap<MetricName, EvaluationResult>,
    pub thresholds: BTreeMap<MetricName, RuleSummary>,
}

impl Decision {
    /// Number of metrics currently in the `Ok` state.
    pub fn healthy_metrics(&self) -> usize {
        self.per_metric
            .values()
            .filter(|r| r.state == MetricState::Ok)
            .count()
    }

    /// Total number of evaluated metrics.
    pub fn total_metrics(&self) -> usize {
        self.per_metric.len()
    }
}

/// Round a metric value to two decimals for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
