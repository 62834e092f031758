//! rollgate-service: concurrency facade for the rollgate evaluator.
//!
//! The evaluator core is single-owner by design. This crate provides the
//! serialization discipline around it: a `GateService` task that
//! exclusively owns the `IngestionGateway`, a cloneable `GateHandle`
//! through which concurrent callers record samples and pull decisions,
//! and a `DecisionLoop` that evaluates on an interval and notifies a
//! callback when the rollback verdict flips.
//!
//! Clocks are injected (`ClockFn`); only this crate's `system_clock`
//! touches wall time, so tests drive the whole stack deterministically.

pub mod service;

pub use service::{
    ClockFn, DecisionCallback, DecisionLoop, GateHandle, GateService, ServiceError, system_clock,
};
