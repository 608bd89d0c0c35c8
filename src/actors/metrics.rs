//! Latency metrics
//!
//! Each monitor owns a [`LatencyGauge`] registered in the shared
//! [`MetricsRegistry`]; dropping the gauge (when the monitor exits)
//! unregisters it, so a check's metrics live exactly as long as its monitor.
//! Samples the gauge recorded but nobody pushed yet are kept for the next
//! batch, so a reload does not lose them.
//!
//! The [`MetricsReporter`] drains all pending samples on a fixed wall-clock
//! interval and pushes them to Librato as one batch of complex gauges.
//!
//! ## Message Flow
//!
//! ```text
//! Monitor probe → LatencyGauge::record → MetricsRegistry
//!                                             ↓ (every 60s)
//!                          MetricsReporter → POST /v1/metrics
//!     ↑
//!     └─── Commands (Flush, Shutdown)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use super::messages::MetricsCommand;

/// Librato metrics endpoint
pub const LIBRATO_ENDPOINT: &str = "https://metrics-api.librato.com/v1/metrics";

/// Push interval for the reporter
pub const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Prefix of every gauge name
const GAUGE_PREFIX: &str = "urlmon.request";

const PUSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct Samples {
    /// Pending samples of every registered gauge
    live: HashMap<String, Vec<u64>>,

    /// Samples left behind by gauges dropped since the last drain
    retired: HashMap<String, Vec<u64>>,
}

/// Latency samples in nanoseconds, keyed by gauge name
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    samples: Arc<Mutex<Samples>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Samples> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register the latency gauge of a check
    pub fn register(&self, check_id: &str) -> LatencyGauge {
        let name = format!("{GAUGE_PREFIX}.{check_id}");
        self.lock().live.entry(name.clone()).or_default();
        LatencyGauge {
            name,
            registry: self.clone(),
        }
    }

    /// Names of the registered gauges, sorted
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().live.keys().cloned().collect();
        names.sort();
        names
    }

    /// Take all pending samples, including those of dropped gauges, leaving
    /// registrations in place
    pub fn drain(&self) -> HashMap<String, Vec<u64>> {
        let mut samples = self.lock();
        let mut drained = std::mem::take(&mut samples.retired);

        for (name, pending) in samples.live.iter_mut() {
            if !pending.is_empty() {
                drained
                    .entry(name.clone())
                    .or_default()
                    .append(pending);
            }
        }

        drained
    }
}

/// Handle a monitor uses to record probe latency
#[derive(Debug)]
pub struct LatencyGauge {
    name: String,
    registry: MetricsRegistry,
}

impl LatencyGauge {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        if let Some(samples) = self.registry.lock().live.get_mut(&self.name) {
            samples.push(nanos);
        }
    }
}

impl Drop for LatencyGauge {
    fn drop(&mut self) {
        let mut samples = self.registry.lock();
        if let Some(mut pending) = samples.live.remove(&self.name)
            && !pending.is_empty()
        {
            // Unpushed samples still go out with the next batch.
            samples
                .retired
                .entry(self.name.clone())
                .or_default()
                .append(&mut pending);
        }
    }
}

/// Librato complex gauge, values in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReport {
    pub name: String,
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

impl GaugeReport {
    pub fn from_samples(name: String, samples: &[u64]) -> Self {
        let millis: Vec<f64> = samples
            .iter()
            .map(|nanos| *nanos as f64 / 1_000_000.0)
            .collect();

        Self {
            name,
            count: millis.len(),
            sum: millis.iter().sum(),
            min: millis.iter().copied().fold(f64::INFINITY, f64::min),
            max: millis.iter().copied().fold(0.0, f64::max),
            sum_squares: millis.iter().map(|m| m * m).sum(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Batch {
    source: String,
    gauges: Vec<GaugeReport>,
}

/// Where and as whom the reporter pushes
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub endpoint: String,
    pub user: String,
    pub token: String,

    /// Source attached to every gauge (host name by default)
    pub source: String,

    pub interval: Duration,
}

impl ReporterConfig {
    pub fn librato(user: impl Into<String>, token: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            endpoint: LIBRATO_ENDPOINT.to_string(),
            user: user.into(),
            token: token.into(),
            source: source.into(),
            interval: REPORT_INTERVAL,
        }
    }
}

pub struct MetricsReporter {
    registry: MetricsRegistry,
    config: ReporterConfig,
    client: reqwest::Client,
    command_rx: mpsc::Receiver<MetricsCommand>,
}

impl MetricsReporter {
    pub fn new(
        registry: MetricsRegistry,
        config: ReporterConfig,
        command_rx: mpsc::Receiver<MetricsCommand>,
    ) -> Self {
        Self {
            registry,
            config,
            client: reqwest::Client::new(),
            command_rx,
        }
    }

    #[instrument(skip(self), fields(source = %self.config.source))]
    pub async fn run(mut self) {
        debug!("starting metrics reporter");

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.push().await {
                        error!("failed to push metrics: {e:#}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MetricsCommand::Flush { respond_to } => {
                            let _ = respond_to.send(self.push().await);
                        }

                        MetricsCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            let _ = respond_to.send(self.push().await);
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("metrics reporter stopped");
    }

    /// Push pending samples; returns the number of gauges sent
    async fn push(&self) -> Result<usize> {
        let mut gauges: Vec<GaugeReport> = self
            .registry
            .drain()
            .into_iter()
            .map(|(name, samples)| GaugeReport::from_samples(name, &samples))
            .collect();

        if gauges.is_empty() {
            trace!("no samples to push");
            return Ok(0);
        }
        gauges.sort_by(|a, b| a.name.cmp(&b.name));

        let count = gauges.len();
        let batch = Batch {
            source: self.config.source.clone(),
            gauges,
        };

        self.client
            .post(&self.config.endpoint)
            .basic_auth(&self.config.user, Some(&self.config.token))
            .timeout(PUSH_TIMEOUT)
            .json(&batch)
            .send()
            .await
            .context("failed to send metrics batch")?
            .error_for_status()
            .context("metrics endpoint rejected batch")?;

        debug!("pushed {count} gauges");
        Ok(count)
    }
}

/// Handle for controlling a MetricsReporter
#[derive(Clone)]
pub struct MetricsHandle {
    sender: mpsc::Sender<MetricsCommand>,
}

impl MetricsHandle {
    pub fn spawn(registry: MetricsRegistry, config: ReporterConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        tokio::spawn(MetricsReporter::new(registry, config, cmd_rx).run());

        Self { sender: cmd_tx }
    }

    /// Push pending samples immediately
    pub async fn flush(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MetricsCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("metrics reporter dropped response")?
    }

    /// Push what is pending and stop the reporter.
    ///
    /// Returns once the final push has completed, with its result.
    pub async fn shutdown(self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MetricsCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("metrics reporter dropped response")?
    }
}
