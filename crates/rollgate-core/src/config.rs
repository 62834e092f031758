//! rollgate.toml configuration parser and validation.
//!
//! Raw config structs mirror the file shape with loosely-typed fields
//! (comparator and duration strings). `GateConfig::validate` turns them
//! into typed `Rule`s and `GateSettings`, failing fast on any malformed
//! rule so evaluation never has to.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Comparator, Rule};

/// Top-level rollgate.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub evaluation: Option<EvaluationConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// The `[evaluation]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Whether a stale metric triggers rollback (default false).
    pub treat_stale_as_rollback: Option<bool>,
    /// Policy for samples whose metric has no rule: "reject" or "track".
    pub unknown_metrics: Option<String>,
    /// Maximum samples retained per metric window.
    pub window_max_samples: Option<usize>,
    /// Maximum sample age retained per metric window (e.g. "15m").
    pub window_max_age: Option<String>,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub metric: String,
    /// "greater_than" or "less_than".
    pub comparator: String,
    pub threshold: f64,
    /// Consecutive breaching samples required (default 1).
    pub consecutive_breaches: Option<u32>,
    /// Maximum age of the latest sample (e.g. "60s", default "60s").
    pub staleness_timeout: Option<String>,
}

/// Policy for samples naming a metric with no configured rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownMetricPolicy {
    /// Return `IngestError::UnknownMetric` to the caller. Default.
    Reject,
    /// Keep an observed-only window; evaluated only if a later
    /// `configure` attaches a rule for the name.
    Track,
}

/// Bounds applied to every metric window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLimits {
    pub max_samples: usize,
    pub max_age: Duration,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            max_samples: 120,
            max_age: Duration::from_secs(15 * 60),
        }
    }
}

/// Validated evaluator settings, ready to hand to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GateSettings {
    pub rules: Vec<Rule>,
    pub treat_stale_as_rollback: bool,
    pub unknown_metrics: UnknownMetricPolicy,
    pub window: WindowLimits,
}

impl GateConfig {
    /// Load and parse a rollgate.toml file. Validation is separate so
    /// callers can inspect the raw config.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GateConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate raw config into typed settings.
    pub fn validate(&self) -> ConfigResult<GateSettings> {
        let evaluation = self.evaluation.clone().unwrap_or_default();

        let unknown_metrics = match evaluation.unknown_metrics.as_deref() {
            None | Some("reject") => UnknownMetricPolicy::Reject,
            Some("track") => UnknownMetricPolicy::Track,
            Some(other) => return Err(ConfigError::UnknownPolicy(other.to_string())),
        };

        let defaults = WindowLimits::default();
        let window = WindowLimits {
            max_samples: evaluation.window_max_samples.unwrap_or(defaults.max_samples),
            max_age: match evaluation.window_max_age.as_deref() {
                Some(s) => parse_duration(s)?,
                None => defaults.max_age,
            },
        };
        if window.max_samples == 0 {
            return Err(ConfigError::EmptyWindow);
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        for raw in &self.rules {
            rules.push(raw.validate()?);
        }
        validate_rules(&rules)?;

        Ok(GateSettings {
            rules,
            treat_stale_as_rollback: evaluation.treat_stale_as_rollback.unwrap_or(false),
            unknown_metrics,
            window,
        })
    }

    /// Scaffold a default config mirroring the classic deployment gate:
    /// error rate above 5%, p95 latency above 1000ms, or success rate
    /// below 95% for two consecutive samples each.
    pub fn scaffold() -> Self {
        let rule = |metric: &str, comparator: &str, threshold: f64| RuleConfig {
            metric: metric.to_string(),
            comparator: comparator.to_string(),
            threshold,
            consecutive_breaches: Some(2),
            staleness_timeout: Some("60s".to_string()),
        };
        GateConfig {
            evaluation: Some(EvaluationConfig {
                treat_stale_as_rollback: Some(false),
                unknown_metrics: Some("reject".to_string()),
                window_max_samples: Some(120),
                window_max_age: Some("15m".to_string()),
            }),
            rules: vec![
                rule("error_rate", "greater_than", 5.0),
                rule("latency_p95", "greater_than", 1000.0),
                rule("success_rate", "less_than", 95.0),
            ],
        }
    }
}

impl RuleConfig {
    /// Validate one raw rule into a typed `Rule`.
    pub fn validate(&self) -> ConfigResult<Rule> {
        if self.metric.trim().is_empty() {
            return Err(ConfigError::EmptyMetricName);
        }
        let comparator = match self.comparator.as_str() {
            "greater_than" => Comparator::GreaterThan,
            "less_than" => Comparator::LessThan,
            other => return Err(ConfigError::UnknownComparator(other.to_string())),
        };
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.metric.clone()));
        }
        let consecutive_breaches = self.consecutive_breaches.unwrap_or(1);
        if consecutive_breaches == 0 {
            return Err(ConfigError::ZeroBreachCount(self.metric.clone()));
        }
        let staleness_timeout = match self.staleness_timeout.as_deref() {
            Some(s) => parse_duration(s)?,
            None => Duration::from_secs(60),
        };
        Ok(Rule {
            metric: self.metric.clone(),
            comparator,
            threshold: self.threshold,
            consecutive_breaches,
            staleness_timeout,
        })
    }
}

/// Cross-rule checks, shared by config loading and re-`configure` calls.
pub fn validate_rules(rules: &[Rule]) -> ConfigResult<()> {
    if rules.is_empty() {
        return Err(ConfigError::EmptyRuleSet);
    }
    let mut seen = HashSet::new();
    for rule in rules {
        if rule.metric.trim().is_empty() {
            return Err(ConfigError::EmptyMetricName);
        }
        if !rule.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(rule.metric.clone()));
        }
        if rule.consecutive_breaches == 0 {
            return Err(ConfigError::ZeroBreachCount(rule.metric.clone()));
        }
        if !seen.insert(rule.metric.as_str()) {
            return Err(ConfigError::DuplicateMetric(rule.metric.clone()));
        }
    }
    Ok(())
}

/// Parse a duration string like "60s", "500ms", "5m". A bare number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}
