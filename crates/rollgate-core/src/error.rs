//! Error types for the rollgate evaluator.

use thiserror::Error;

use crate::types::EpochMillis;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating rule configuration.
///
/// All rule shape problems surface here, at load time. Evaluation itself
/// never fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown comparator: {0} (expected greater_than or less_than)")]
    UnknownComparator(String),

    #[error("unknown metric policy: {0} (expected reject or track)")]
    UnknownPolicy(String),

    #[error("rule for {0}: consecutive_breaches must be at least 1")]
    ZeroBreachCount(String),

    #[error("rule has an empty metric name")]
    EmptyMetricName,

    #[error("duplicate rule for metric: {0}")]
    DuplicateMetric(String),

    #[error("rule for {0}: threshold must be a finite number")]
    InvalidThreshold(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("window max_samples must be at least 1")]
    EmptyWindow,

    #[error("no rules configured")]
    EmptyRuleSet,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Result type alias for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors returned to callers of `record`.
///
/// Staleness is deliberately not here: a stale metric is a first-class
/// evaluation state, surfaced in the `Decision`, never an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error(
        "out-of-order sample for {metric}: observed_at {observed_at} precedes latest {latest}"
    )]
    OutOfOrderSample {
        metric: String,
        observed_at: EpochMillis,
        latest: EpochMillis,
    },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}
