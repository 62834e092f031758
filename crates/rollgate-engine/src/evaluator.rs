//! Per-metric rule evaluation with consecutive-breach hysteresis.
//!
//! The breach counter advances once per recorded sample (`observe`), so a
//! single transient spike never trips the gate and `evaluate` stays a
//! pure read: calling it repeatedly with the same window contents and
//! `now` yields identical results.

use tracing::{debug, warn};

use rollgate_core::{EpochMillis, EvaluationResult, MetricState, Rule, round2};

use crate::window::MetricWindow;

/// Consecutive-breach counter for one metric.
///
/// Resets to zero on any non-breaching observation.
#[derive(Debug, Clone, Default)]
pub struct BreachTracker {
    consecutive: u32,
}

impl BreachTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation and return the updated count.
    pub fn record(&mut self, breaching: bool) -> u32 {
        if breaching {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.consecutive
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }
}

/// Evaluates one metric's window against its rule.
///
/// Owns the metric's breach counter for the lifetime of the rule.
#[derive(Debug)]
pub struct MetricEvaluator {
    rule: Rule,
    tracker: BreachTracker,
}

impl MetricEvaluator {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            tracker: BreachTracker::new(),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Feed one recorded value through the breach counter.
    ///
    /// Called from the ingestion path, once per accepted sample.
    pub fn observe(&mut self, value: f64) -> u32 {
        let breaching = self.rule.comparator.breaches(value, self.rule.threshold);
        let count = self.tracker.record(breaching);
        if breaching {
            let gated = count >= self.rule.consecutive_breaches;
            if gated {
                warn!(
                    metric = %self.rule.metric,
                    value,
                    threshold = self.rule.threshold,
                    consecutive = count,
                    "metric breached threshold past hysteresis gate"
                );
            } else {
                debug!(
                    metric = %self.rule.metric,
                    value,
                    threshold = self.rule.threshold,
                    consecutive = count,
                    required = self.rule.consecutive_breaches,
                    "sample breached threshold"
                );
            }
        }
        count
    }

    /// Compute the metric's current result. Pure with respect to this
    /// evaluator: staleness first, then the hysteresis gate.
    pub fn evaluate(&self, window: &MetricWindow, now: EpochMillis) -> EvaluationResult {
        let timeout_ms = self.rule.staleness_timeout.as_millis() as u64;

        if let Some(latest) = window.latest()
            && now.saturating_sub(latest.observed_at) <= timeout_ms
        {
            let count = self.tracker.count();
            let breached = count >= self.rule.consecutive_breaches;
            let reason = breached.then(|| {
                format!(
                    "{} breached: {:.1} {} {:.1} ({} consecutive)",
                    self.rule.metric,
                    latest.value,
                    self.rule.comparator.symbol(),
                    self.rule.threshold,
                    count,
                )
            });
            return EvaluationResult {
                metric: self.rule.metric.clone(),
                current_value: Some(round2(latest.value)),
                breached,
                consecutive_breaches: count,
                state: if breached {
                    MetricState::Breaching
                } else {
                    MetricState::Ok
                },
                reason,
            };
        }

        // Empty window, or the latest sample aged out: stale wins over
        // any value comparison.
        EvaluationResult {
            metric: self.rule.metric.clone(),
            current_value: window.latest().map(|s| round2(s.value)),
            breached: false,
            consecutive_breaches: self.tracker.count(),
            state: MetricState::Stale,
            reason: Some(format!(
                "{} stale: no data in last {}s",
                self.rule.metric,
                self.rule.staleness_timeout.as_secs(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollgate_core::{Comparator, Sample, WindowLimits};
    use std::time::Duration;

    fn rule(consecutive: u32) -> Rule {
        Rule {
            metric: "error_rate".to_string(),
            comparator: Comparator::GreaterThan,
            threshold: 5.0,
            consecutive_breaches: consecutive,
            staleness_timeout: Duration::from_secs(60),
        }
    }

    fn window_with(samples: &[(f64, EpochMillis)]) -> MetricWindow {
        let mut window = MetricWindow::new(WindowLimits::default());
        for (value, at) in samples {
            window
                .push(Sample::new("error_rate", *value, *at))
                .unwrap();
        }
        window
    }

    #[test]
    fn tracker_counts_and_resets() {
        let mut tracker = BreachTracker::new();
        assert_eq!(tracker.record(true), 1);
        assert_eq!(tracker.record(true), 2);
        assert_eq!(tracker.record(false), 0);
        assert_eq!(tracker.record(true), 1);
    }

    #[test]
    fn empty_window_is_stale() {
        let evaluator = MetricEvaluator::new(rule(2));
        let result = evaluator.evaluate(&window_with(&[]), 100_000);

        assert_eq!(result.state, MetricState::Stale);
        assert!(!result.breached);
        assert_eq!(result.current_value, None);
        assert_eq!(
            result.reason.as_deref(),
            Some("error_rate stale: no data in last 60s")
        );
    }

    #[test]
    fn aged_out_sample_is_stale_even_if_breaching() {
        let mut evaluator = MetricEvaluator::new(rule(1));
        evaluator.observe(12.0);
        let window = window_with(&[(12.0, 0)]);

        // 61s later the sample is past the 60s staleness timeout.
        let result = evaluator.evaluate(&window, 61_000);
        assert_eq!(result.state, MetricState::Stale);
        assert!(!result.breached);
        // The last value is still reported for visibility.
        assert_eq!(result.current_value, Some(12.0));
    }

    #[test]
    fn breach_below_gate_stays_ok() {
        let mut evaluator = MetricEvaluator::new(rule(2));
        evaluator.observe(6.0);
        let window = window_with(&[(6.0, 0)]);

        let result = evaluator.evaluate(&window, 1_000);
        assert_eq!(result.state, MetricState::Ok);
        assert!(!result.breached);
        assert_eq!(result.consecutive_breaches, 1);
        assert!(result.reason.is_none());
    }

    #[test]
    fn breach_at_gate_reports_breaching() {
        let mut evaluator = MetricEvaluator::new(rule(2));
        evaluator.observe(6.0);
        evaluator.observe(7.0);
        let window = window_with(&[(6.0, 0), (7.0, 1_000)]);

        let result = evaluator.evaluate(&window, 1_000);
        assert_eq!(result.state, MetricState::Breaching);
        assert!(result.breached);
        assert_eq!(
            result.reason.as_deref(),
            Some("error_rate breached: 7.0 > 5.0 (2 consecutive)")
        );
    }

    #[test]
    fn intervening_recovery_resets_counter() {
        let mut evaluator = MetricEvaluator::new(rule(2));
        assert_eq!(evaluator.observe(6.0), 1);
        assert_eq!(evaluator.observe(3.0), 0);
        assert_eq!(evaluator.observe(7.0), 1);

        let window = window_with(&[(6.0, 0), (3.0, 1_000), (7.0, 2_000)]);
        let result = evaluator.evaluate(&window, 2_000);
        assert!(!result.breached);
        assert_eq!(result.state, MetricState::Ok);
    }

    #[test]
    fn evaluate_is_idempotent() {
        let mut evaluator = MetricEvaluator::new(rule(2));
        evaluator.observe(6.0);
        evaluator.observe(7.0);
        let window = window_with(&[(6.0, 0), (7.0, 1_000)]);

        let first = evaluator.evaluate(&window, 1_500);
        let second = evaluator.evaluate(&window, 1_500);
        assert_eq!(first, second);
    }

    #[test]
    fn less_than_reason_format() {
        let mut evaluator = MetricEvaluator::new(Rule {
            metric: "success_rate".to_string(),
            comparator: Comparator::LessThan,
            threshold: 95.0,
            consecutive_breaches: 1,
            staleness_timeout: Duration::from_secs(60),
        });
        evaluator.observe(90.5);

        let mut window = MetricWindow::new(WindowLimits::default());
        window
            .push(Sample::new("success_rate", 90.5, 1_000))
            .unwrap();

        let result = evaluator.evaluate(&window, 1_000);
        assert_eq!(
            result.reason.as_deref(),
            Some("success_rate breached: 90.5 < 95.0 (1 consecutive)")
        );
    }
}
