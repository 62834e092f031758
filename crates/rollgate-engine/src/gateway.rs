//! Ingestion gateway: the evaluator's external surface.
//!
//! Exposes exactly three operations to collaborators (transport layer,
//! CLI, scheduler): `record`, `evaluate`, and `configure`. The gateway
//! validates incoming metric names against the configured rule set and
//! applies the unknown-metric policy; evaluation is pull-based and never
//! triggered from the ingestion path.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use rollgate_core::{
    ConfigResult, Decision, EpochMillis, GateConfig, GateSettings, IngestError, IngestResult,
    MetricName, Rule, Sample, UnknownMetricPolicy, WindowLimits, validate_rules,
};

use crate::engine::DecisionEngine;
use crate::window::MetricWindow;

/// Accepts samples, owns the decision engine, and enforces the
/// unknown-metric policy.
pub struct IngestionGateway {
    engine: DecisionEngine,
    policy: UnknownMetricPolicy,
    limits: WindowLimits,
    /// Observed-only windows under `UnknownMetricPolicy::Track`:
    /// recorded but not evaluated until a rule adopts them.
    orphans: HashMap<MetricName, MetricWindow>,
}

impl IngestionGateway {
    /// Build a gateway from validated settings.
    pub fn new(settings: GateSettings) -> Self {
        info!(
            rules = settings.rules.len(),
            policy = ?settings.unknown_metrics,
            "ingestion gateway configured"
        );
        Self {
            engine: DecisionEngine::new(
                settings.rules,
                settings.treat_stale_as_rollback,
                settings.window,
            ),
            policy: settings.unknown_metrics,
            limits: settings.window,
            orphans: HashMap::new(),
        }
    }

    /// Build a gateway straight from a raw config, validating it.
    pub fn from_config(config: &GateConfig) -> ConfigResult<Self> {
        Ok(Self::new(config.validate()?))
    }

    /// Record one observed sample.
    ///
    /// Unknown metric names are rejected or tracked per policy; either
    /// way ingestion never evaluates eagerly and never blocks on I/O.
    pub fn record(
        &mut self,
        metric: &str,
        value: f64,
        observed_at: EpochMillis,
    ) -> IngestResult<()> {
        if self.engine.contains(metric) {
            return self.engine.record(Sample::new(metric, value, observed_at));
        }
        match self.policy {
            UnknownMetricPolicy::Reject => {
                warn!(%metric, value, "rejected sample for unconfigured metric");
                Err(IngestError::UnknownMetric(metric.to_string()))
            }
            UnknownMetricPolicy::Track => {
                let window = self
                    .orphans
                    .entry(metric.to_string())
                    .or_insert_with(|| MetricWindow::new(self.limits));
                window.push(Sample::new(metric, value, observed_at))?;
                debug!(%metric, value, "tracking sample for unconfigured metric");
                Ok(())
            }
        }
    }

    /// Evaluate all configured rules at `now`.
    pub fn evaluate(&self, now: EpochMillis) -> Decision {
        self.engine.evaluate(now)
    }

    /// Replace the rule set atomically.
    ///
    /// Previously orphaned windows whose metric gained a rule are
    /// adopted with their recorded history.
    pub fn configure(&mut self, rules: Vec<Rule>) -> ConfigResult<()> {
        validate_rules(&rules)?;

        let mut adopted = HashMap::new();
        for rule in &rules {
            if let Some(window) = self.orphans.remove(&rule.metric) {
                debug!(metric = %rule.metric, samples = window.len(), "adopting tracked metric");
                adopted.insert(rule.metric.clone(), window);
            }
        }

        self.engine.configure(rules, adopted);
        info!("rule set replaced");
        Ok(())
    }

    /// Metric names currently tracked without a rule.
    pub fn orphaned_metrics(&self) -> Vec<&str> {
        self.orphans.keys().map(String::as_str).collect()
    }
}
