//! Gate service: serializes all evaluator access through one task.
//!
//! Concurrent callers (HTTP handlers, background pollers) hold a cloned
//! `GateHandle`; every `record`, `evaluate`, and `configure` funnels
//! through the `GateService` command loop, which exclusively owns the
//! `IngestionGateway`. Commands are bounded and never perform outbound
//! I/O, so no caller can block the loop indefinitely.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use rollgate_core::{ConfigError, Decision, EpochMillis, IngestError, Rule};
use rollgate_engine::IngestionGateway;

/// Clock source injected into the decision loop. The evaluator core
/// itself only ever sees the timestamps this produces.
pub type ClockFn = Arc<dyn Fn() -> EpochMillis + Send + Sync>;

/// Callback invoked when the rollback verdict changes.
///
/// The deployment controller wires its rollback action in here.
pub type DecisionCallback = Arc<dyn Fn(Decision) -> BoxFuture + Send + Sync>;

type BoxFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// Errors surfaced through a `GateHandle`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service task has stopped.
    #[error("gate service unavailable")]
    Closed,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

enum Command {
    Record {
        metric: String,
        value: f64,
        observed_at: EpochMillis,
        reply: oneshot::Sender<Result<(), IngestError>>,
    },
    Evaluate {
        now: EpochMillis,
        reply: oneshot::Sender<Decision>,
    },
    Configure {
        rules: Vec<Rule>,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
}

/// The sequential task owning the gateway.
pub struct GateService {
    gateway: IngestionGateway,
    rx: mpsc::Receiver<Command>,
}

impl GateService {
    /// Wrap a gateway in a service and return the handle for callers.
    pub fn new(gateway: IngestionGateway) -> (Self, GateHandle) {
        let (tx, rx) = mpsc::channel(64);
        (Self { gateway, rx }, GateHandle { tx })
    }

    /// Run the command loop until shutdown or until every handle drops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("gate service started");
        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(Command::Record { metric, value, observed_at, reply }) => {
                            let _ = reply.send(self.gateway.record(&metric, value, observed_at));
                        }
                        Some(Command::Evaluate { now, reply }) => {
                            let _ = reply.send(self.gateway.evaluate(now));
                        }
                        Some(Command::Configure { rules, reply }) => {
                            let _ = reply.send(self.gateway.configure(rules));
                        }
                        None => {
                            debug!("all gate handles dropped");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("gate service shutting down");
                    break;
                }
            }
        }
    }
}

/// Cloneable async handle to the gate service.
#[derive(Clone)]
pub struct GateHandle {
    tx: mpsc::Sender<Command>,
}

impl GateHandle {
    /// Record one observed sample.
    pub async fn record(
        &self,
        metric: &str,
        value: f64,
        observed_at: EpochMillis,
    ) -> Result<(), ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Record {
                metric: metric.to_string(),
                value,
                observed_at,
                reply,
            })
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)??;
        Ok(())
    }

    /// Evaluate all configured rules at `now`.
    pub async fn evaluate(&self, now: EpochMillis) -> Result<Decision, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Evaluate { now, reply })
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Replace the rule set atomically.
    pub async fn configure(&self, rules: Vec<Rule>) -> Result<(), ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Configure { rules, reply })
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)??;
        Ok(())
    }
}

/// Wall-clock source for production callers.
pub fn system_clock() -> ClockFn {
    Arc::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    })
}

/// Periodic evaluation driver.
///
/// Polls the gate on a fixed interval and invokes the callback whenever
/// the rollback verdict flips, so the deployment controller reacts once
/// per transition rather than once per tick.
pub struct DecisionLoop {
    handle: GateHandle,
    interval: Duration,
    clock: ClockFn,
    on_change: Option<DecisionCallback>,
}

impl DecisionLoop {
    pub fn new(handle: GateHandle, interval: Duration) -> Self {
        Self {
            handle,
            interval,
            clock: system_clock(),
            on_change: None,
        }
    }

    /// Replace the clock source (tests inject a deterministic one).
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Set the callback invoked on verdict transitions.
    pub fn with_callback(mut self, callback: DecisionCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    /// Run the evaluation loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "decision loop started"
        );
        let mut last_rollback = false;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let now = (self.clock)();
                    let decision = match self.handle.evaluate(now).await {
                        Ok(d) => d,
                        Err(e) => {
                            error!(error = %e, "evaluation failed, stopping loop");
                            break;
                        }
                    };

                    if decision.should_rollback == last_rollback {
                        continue;
                    }
                    last_rollback = decision.should_rollback;

                    if decision.should_rollback {
                        warn!(reasons = ?decision.reasons, "rollback verdict raised");
                    } else {
                        info!("rollback verdict cleared");
                    }

                    if let Some(callback) = &self.on_change
                        && let Err(e) = callback(decision).await
                    {
                        warn!(error = %e, "decision callback failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("decision loop shutting down");
                    break;
                }
            }
        }
    }
}
