//! Decision engine: aggregates per-metric evaluations into one verdict.
//!
//! Owns every metric's window, rule, and breach counter for the process
//! lifetime. Rules are kept in configuration order so `Decision.reasons`
//! is stable across calls. `evaluate` is deterministic: no clock reads,
//! no randomness, no mutation.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use rollgate_core::{
    Decision, EpochMillis, IngestError, IngestResult, MetricName, MetricState, Rule, RuleSummary,
    Sample, WindowLimits,
};

use crate::evaluator::MetricEvaluator;
use crate::window::MetricWindow;

/// One tracked metric: its rule, breach counter, and sample window.
struct MetricSlot {
    evaluator: MetricEvaluator,
    window: MetricWindow,
}

/// Aggregates evaluator outputs across all tracked metrics into one
/// rollback decision with reasons.
pub struct DecisionEngine {
    /// Slots in rule configuration order.
    slots: Vec<MetricSlot>,
    /// metric name → slot position.
    index: HashMap<MetricName, usize>,
    treat_stale_as_rollback: bool,
    limits: WindowLimits,
}

impl DecisionEngine {
    /// Build an engine from validated rules.
    pub fn new(rules: Vec<Rule>, treat_stale_as_rollback: bool, limits: WindowLimits) -> Self {
        let mut engine = Self {
            slots: Vec::new(),
            index: HashMap::new(),
            treat_stale_as_rollback,
            limits,
        };
        engine.configure(rules, HashMap::new());
        engine
    }

    /// Whether a rule is configured for `metric`.
    pub fn contains(&self, metric: &str) -> bool {
        self.index.contains_key(metric)
    }

    /// Metric names in configuration order.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.evaluator.rule().metric.as_str())
    }

    /// Record a sample for a configured metric and advance its breach
    /// counter. A rejected (out-of-order) sample leaves both the window
    /// and the counter untouched.
    pub fn record(&mut self, sample: Sample) -> IngestResult<()> {
        let Some(&i) = self.index.get(&sample.metric) else {
            return Err(IngestError::UnknownMetric(sample.metric));
        };
        let slot = &mut self.slots[i];
        let value = sample.value;
        slot.window.push(sample)?;
        slot.evaluator.observe(value);
        Ok(())
    }

    /// Evaluate every configured rule and produce a decision.
    ///
    /// `should_rollback` is the OR across breaching metrics; a stale
    /// metric triggers only when `treat_stale_as_rollback` is set, and
    /// otherwise contributes a non-triggering advisory reason.
    pub fn evaluate(&self, now: EpochMillis) -> Decision {
        let mut should_rollback = false;
        let mut reasons = Vec::new();
        let mut per_metric = BTreeMap::new();
        let mut thresholds = BTreeMap::new();

        for slot in &self.slots {
            let rule = slot.evaluator.rule();
            thresholds.insert(rule.metric.clone(), RuleSummary::from(rule));

            let result = slot.evaluator.evaluate(&slot.window, now);
            match result.state {
                MetricState::Breaching => {
                    should_rollback = true;
                    if let Some(reason) = &result.reason {
                        reasons.push(reason.clone());
                    }
                }
                MetricState::Stale => {
                    if self.treat_stale_as_rollback {
                        should_rollback = true;
                    }
                    if let Some(reason) = &result.reason {
                        reasons.push(reason.clone());
                    }
                }
                MetricState::Ok => {}
            }
            per_metric.insert(result.metric.clone(), result);
        }

        if should_rollback {
            info!(
                evaluated_at = now,
                reasons = reasons.len(),
                "rollback recommended"
            );
        } else {
            debug!(
                evaluated_at = now,
                metrics = per_metric.len(),
                "deployment healthy"
            );
        }

        Decision {
            should_rollback,
            reasons,
            evaluated_at: now,
            per_metric,
            thresholds,
        }
    }

    /// Replace the rule set atomically.
    ///
    /// Windows survive for metrics still configured. A metric whose rule
    /// parameters changed gets its breach counter reset; an unchanged
    /// rule keeps its counter. `adopted` supplies pre-recorded windows
    /// for metrics that were previously tracked without a rule. State
    /// for removed metrics is dropped.
    pub fn configure(&mut self, rules: Vec<Rule>, mut adopted: HashMap<MetricName, MetricWindow>) {
        let mut old: HashMap<MetricName, MetricSlot> = self
            .slots
            .drain(..)
            .map(|slot| (slot.evaluator.rule().metric.clone(), slot))
            .collect();

        let mut slots = Vec::with_capacity(rules.len());
        let mut index = HashMap::with_capacity(rules.len());

        for rule in rules {
            let metric = rule.metric.clone();
            let slot = match old.remove(&metric) {
                Some(existing) if existing.evaluator.rule() == &rule => existing,
                Some(existing) => {
                    debug!(metric = %metric, "rule changed, breach counter reset");
                    MetricSlot {
                        evaluator: MetricEvaluator::new(rule),
                        window: existing.window,
                    }
                }
                None => MetricSlot {
                    evaluator: MetricEvaluator::new(rule),
                    window: adopted
                        .remove(&metric)
                        .unwrap_or_else(|| MetricWindow::new(self.limits)),
                },
            };
            index.insert(metric, slots.len());
            slots.push(slot);
        }

        for metric in old.keys() {
            debug!(metric = %metric, "metric removed from rule set");
        }

        self.slots = slots;
        self.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollgate_core::Comparator;
    use std::time::Duration;

    fn rule(metric: &str, comparator: Comparator, threshold: f64, consecutive: u32) -> Rule {
        Rule {
            metric: metric.to_string(),
            comparator,
            threshold,
            consecutive_breaches: consecutive,
            staleness_timeout: Duration::from_secs(60),
        }
    }

    fn engine_with(rules: Vec<Rule>) -> DecisionEngine {
        DecisionEngine::new(rules, false, WindowLimits::default())
    }

    fn error_rate_engine() -> DecisionEngine {
        engine_with(vec![rule("error_rate", Comparator::GreaterThan, 5.0, 2)])
    }

    #[test]
    fn two_consecutive_breaches_trigger_rollback() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 6.0, 0)).unwrap();
        engine.record(Sample::new("error_rate", 7.0, 1_000)).unwrap();

        let decision = engine.evaluate(1_000);
        assert!(decision.should_rollback);
        assert_eq!(
            decision.reasons,
            vec!["error_rate breached: 7.0 > 5.0 (2 consecutive)"]
        );
        assert_eq!(
            decision.per_metric["error_rate"].state,
            MetricState::Breaching
        );
    }

    #[test]
    fn intervening_recovery_prevents_rollback() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 6.0, 0)).unwrap();
        engine.record(Sample::new("error_rate", 3.0, 1_000)).unwrap();

        let decision = engine.evaluate(1_000);
        assert!(!decision.should_rollback);
        assert_eq!(decision.per_metric["error_rate"].consecutive_breaches, 0);
    }

    #[test]
    fn never_recorded_metric_is_stale_not_rollback() {
        let engine = error_rate_engine();
        let decision = engine.evaluate(100_000);

        assert!(!decision.should_rollback);
        assert_eq!(decision.per_metric["error_rate"].state, MetricState::Stale);
        // Stale still leaves an advisory reason for operators.
        assert_eq!(
            decision.reasons,
            vec!["error_rate stale: no data in last 60s"]
        );
    }

    #[test]
    fn stale_triggers_rollback_when_configured() {
        let rules = vec![rule("error_rate", Comparator::GreaterThan, 5.0, 2)];
        let engine = DecisionEngine::new(rules, true, WindowLimits::default());

        let decision = engine.evaluate(100_000);
        assert!(decision.should_rollback);
    }

    #[test]
    fn stale_wins_over_breaching_value() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 9.0, 0)).unwrap();
        engine.record(Sample::new("error_rate", 9.0, 1_000)).unwrap();

        // 62s after the last sample: stale despite two breaching values.
        let decision = engine.evaluate(63_000);
        assert!(!decision.should_rollback);
        assert_eq!(decision.per_metric["error_rate"].state, MetricState::Stale);
    }

    #[test]
    fn rollback_from_worst_offender_only() {
        let mut engine = engine_with(vec![
            rule("error_rate", Comparator::GreaterThan, 5.0, 1),
            rule("success_rate", Comparator::LessThan, 95.0, 1),
        ]);
        engine.record(Sample::new("error_rate", 2.0, 0)).unwrap();
        engine.record(Sample::new("success_rate", 90.0, 0)).unwrap();

        let decision = engine.evaluate(500);
        assert!(decision.should_rollback);
        assert_eq!(decision.per_metric["error_rate"].state, MetricState::Ok);
        assert_eq!(
            decision.reasons,
            vec!["success_rate breached: 90.0 < 95.0 (1 consecutive)"]
        );
    }

    #[test]
    fn reasons_follow_configuration_order() {
        let mut engine = engine_with(vec![
            rule("latency_p95", Comparator::GreaterThan, 1000.0, 1),
            rule("error_rate", Comparator::GreaterThan, 5.0, 1),
        ]);
        engine
            .record(Sample::new("error_rate", 6.0, 0))
            .unwrap();
        engine
            .record(Sample::new("latency_p95", 1500.0, 0))
            .unwrap();

        let decision = engine.evaluate(500);
        // latency_p95 was configured first, so its reason leads.
        assert!(decision.reasons[0].starts_with("latency_p95"));
        assert!(decision.reasons[1].starts_with("error_rate"));
    }

    #[test]
    fn evaluate_is_idempotent() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 6.0, 0)).unwrap();
        engine.record(Sample::new("error_rate", 7.0, 1_000)).unwrap();

        let first = engine.evaluate(2_000);
        let second = engine.evaluate(2_000);
        assert_eq!(first, second);
    }

    #[test]
    fn record_unknown_metric_rejected() {
        let mut engine = error_rate_engine();
        let err = engine
            .record(Sample::new("memory_usage", 80.0, 0))
            .unwrap_err();
        assert_eq!(err, IngestError::UnknownMetric("memory_usage".to_string()));
    }

    #[test]
    fn out_of_order_rejection_preserves_counter() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 6.0, 5_000)).unwrap();
        let err = engine
            .record(Sample::new("error_rate", 9.0, 1_000))
            .unwrap_err();
        assert!(matches!(err, IngestError::OutOfOrderSample { .. }));

        let decision = engine.evaluate(5_000);
        assert_eq!(decision.per_metric["error_rate"].consecutive_breaches, 1);
        assert_eq!(decision.per_metric["error_rate"].current_value, Some(6.0));
    }

    #[test]
    fn reconfigure_keeps_counter_for_unchanged_rule() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 6.0, 0)).unwrap();

        engine.configure(
            vec![rule("error_rate", Comparator::GreaterThan, 5.0, 2)],
            HashMap::new(),
        );
        engine.record(Sample::new("error_rate", 7.0, 1_000)).unwrap();

        // The pre-reconfigure breach still counts.
        assert!(engine.evaluate(1_000).should_rollback);
    }

    #[test]
    fn reconfigure_resets_counter_for_changed_rule() {
        let mut engine = error_rate_engine();
        engine.record(Sample::new("error_rate", 6.0, 0)).unwrap();

        // Same metric, different threshold.
        engine.configure(
            vec![rule("error_rate", Comparator::GreaterThan, 4.0, 2)],
            HashMap::new(),
        );
        engine.record(Sample::new("error_rate", 7.0, 1_000)).unwrap();

        let decision = engine.evaluate(1_000);
        assert!(!decision.should_rollback);
        assert_eq!(decision.per_metric["error_rate"].consecutive_breaches, 1);
        // The window itself survived the reconfigure.
        assert_eq!(decision.per_metric["error_rate"].current_value, Some(7.0));
    }

    #[test]
    fn reconfigure_drops_removed_metrics() {
        let mut engine = engine_with(vec![
            rule("error_rate", Comparator::GreaterThan, 5.0, 1),
            rule("latency_p95", Comparator::GreaterThan, 1000.0, 1),
        ]);
        engine.record(Sample::new("latency_p95", 2000.0, 0)).unwrap();

        engine.configure(
            vec![rule("error_rate", Comparator::GreaterThan, 5.0, 1)],
            HashMap::new(),
        );

        let decision = engine.evaluate(500);
        assert_eq!(decision.total_metrics(), 1);
        assert!(!decision.per_metric.contains_key("latency_p95"));
        assert!(engine.record(Sample::new("latency_p95", 100.0, 0)).is_err());
    }

    #[test]
    fn thresholds_echo_configured_rules() {
        let engine = error_rate_engine();
        let decision = engine.evaluate(0);

        let summary = &decision.thresholds["error_rate"];
        assert_eq!(summary.threshold, 5.0);
        assert_eq!(summary.consecutive_breaches, 2);
        assert_eq!(summary.staleness_timeout_secs, 60);
    }
}
