//! rollgate-engine: the deployment health evaluator core.
//!
//! Ingests timestamped metric samples, keeps a bounded rolling window
//! per metric, applies consecutive-breach hysteresis and staleness
//! handling, and aggregates per-metric verdicts into one explainable
//! rollback decision.
//!
//! # Evaluation Algorithm
//!
//! ```text
//! record(metric, value, observed_at):
//!     window.push(sample)            // rejects out-of-order timestamps
//!     breaching = comparator(value, threshold)
//!     counter   = breaching ? counter + 1 : 0
//!
//! evaluate(now):                     // pure read, per configured rule
//!     if window empty or latest older than staleness_timeout:
//!         state = STALE              // never triggers unless configured to
//!     else if counter >= consecutive_breaches:
//!         state = BREACHING          // contributes a rollback reason
//!     else:
//!         state = OK
//!     should_rollback = OR over breaching metrics
//! ```
//!
//! The hysteresis gate means a single transient spike never triggers a
//! rollback, and the staleness timeout means missing data is reported as
//! unknown rather than healthy.
//!
//! Timestamps are injected by callers; this crate never reads a clock.

pub mod engine;
pub mod evaluator;
pub mod gateway;
pub mod window;

pub use engine::DecisionEngine;
pub use evaluator::{BreachTracker, MetricEvaluator};
pub use gateway::IngestionGateway;
pub use window::MetricWindow;
