//! MonitorActor - Probes one check on its own schedule
//!
//! ## Loop
//!
//! ```text
//! sleep(effective interval) → cancelled? → GET target → classify → snapshot → alert sink
//!      ↑                          │ yes                                            │
//!      │                          └──→ Stopped                                     │
//!      └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first sleep happens before the first probe so a reload does not fire
//! every probe at once. Cancellation is cooperative: it can cut a sleep
//! short, but an in-flight probe always completes (bounded by the request
//! timeout) before the loop observes the signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::messages::{CheckEvent, MonitorState};
use super::metrics::{LatencyGauge, MetricsRegistry};
use crate::alerts::AlertSink;
use crate::check::Check;
use crate::probe;
use crate::status::StatusSnapshot;

/// Collaborators shared by every monitor
#[derive(Clone)]
pub struct MonitorContext {
    /// HTTP client reused across all probes
    pub client: reqwest::Client,

    pub alerts: Arc<dyn AlertSink>,

    pub metrics: MetricsRegistry,
}

impl MonitorContext {
    pub fn new(alerts: Arc<dyn AlertSink>, metrics: MetricsRegistry) -> Self {
        Self {
            client: reqwest::Client::new(),
            alerts,
            metrics,
        }
    }
}

/// Actor that probes a single check until cancelled
pub struct MonitorActor {
    check: Arc<Check>,

    client: reqwest::Client,

    alerts: Arc<dyn AlertSink>,

    /// Snapshot of the generation this monitor belongs to
    snapshot: Arc<StatusSnapshot>,

    /// Scoped to this actor; unregisters when the actor exits
    gauge: LatencyGauge,

    shutdown_rx: watch::Receiver<bool>,

    state: Arc<watch::Sender<MonitorState>>,
}

impl MonitorActor {
    fn new(
        check: Arc<Check>,
        snapshot: Arc<StatusSnapshot>,
        context: &MonitorContext,
        shutdown_rx: watch::Receiver<bool>,
        state: Arc<watch::Sender<MonitorState>>,
    ) -> Self {
        Self {
            gauge: context.metrics.register(check.id()),
            check,
            client: context.client.clone(),
            alerts: context.alerts.clone(),
            snapshot,
            shutdown_rx,
            state,
        }
    }

    #[instrument(skip(self), fields(check = %self.check.id()))]
    pub async fn run(mut self) {
        let delay = self.check.effective_interval();
        debug!("starting monitor for {} every {delay:?}", self.check.target());

        self.state.send_if_modified(|state| {
            if *state == MonitorState::Starting {
                *state = MonitorState::Running;
                true
            } else {
                false
            }
        });

        loop {
            let cancelled = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                // A dropped sender means nobody can stop us any more; stop now.
                _ = self.shutdown_rx.wait_for(|cancel| *cancel) => true,
            };

            if cancelled || *self.shutdown_rx.borrow() {
                break;
            }

            self.probe_once().await;
        }

        info!("{} shutdown", self.check.id());
        self.state.send_replace(MonitorState::Stopped);
    }

    /// Probe, record latency, update the snapshot and hand the outcome to the sink
    async fn probe_once(&self) {
        let (outcome, elapsed) = probe::execute(&self.client, &self.check).await;
        self.gauge.record(elapsed);

        let event = CheckEvent::new(self.check.id(), self.check.target().clone(), outcome);

        if event.severity.is_ok() {
            info!("Success: {} {} {}", event.check_id, event.url, event.message);
        } else {
            warn!("Fail: {} {} {}", event.check_id, event.url, event.message);
        }

        if !self.snapshot.record(&event).await {
            error!("check {} missing from its own snapshot", event.check_id);
        }

        self.alerts.send(&event).await;
    }
}

/// Handle for cancelling and joining a MonitorActor
pub struct MonitorHandle {
    check_id: String,
    shutdown_tx: watch::Sender<bool>,
    state: Arc<watch::Sender<MonitorState>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Spawn a monitor for `check` writing into `snapshot`
    pub fn spawn(check: Arc<Check>, snapshot: Arc<StatusSnapshot>, context: &MonitorContext) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(watch::Sender::new(MonitorState::Starting));
        let check_id = check.id().to_string();

        let actor = MonitorActor::new(check, snapshot, context, shutdown_rx, state.clone());
        let task = tokio::spawn(actor.run());

        Self {
            check_id,
            shutdown_tx,
            state,
            task,
        }
    }

    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Receiver following this monitor's lifecycle
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Raise the cancellation signal; returns `false` if it was already raised
    pub fn cancel(&self) -> bool {
        let raised = self.shutdown_tx.send_if_modified(|cancel| {
            if *cancel {
                false
            } else {
                *cancel = true;
                true
            }
        });

        if raised {
            self.state.send_if_modified(|state| {
                if state.is_live() {
                    *state = MonitorState::Stopping;
                    true
                } else {
                    false
                }
            });
        }

        raised
    }

    /// Wait until the monitor loop has exited
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("monitor for {} ended abnormally: {e}", self.check_id);
        }
        self.state.send_replace(MonitorState::Stopped);
    }

    /// Cancel and wait for the loop to exit
    pub async fn stop(self) {
        self.cancel();
        self.join().await;
    }
}
