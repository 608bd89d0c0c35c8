//! Message types shared by monitors and their collaborators

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use url::Url;

use crate::probe::{ProbeOutcome, Severity};

/// Classified result of one probe cycle
///
/// Written into the generation's status snapshot and handed to the alert sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEvent {
    /// Id of the check that produced the event
    pub check_id: String,

    /// Probed target
    pub url: Url,

    pub severity: Severity,

    /// HTTP status text on success, failure description otherwise
    pub message: String,

    /// When the probe finished
    pub timestamp: DateTime<Utc>,
}

impl CheckEvent {
    pub fn new(check_id: impl Into<String>, url: Url, outcome: ProbeOutcome) -> Self {
        Self {
            check_id: check_id.into(),
            url,
            severity: outcome.severity,
            message: outcome.message,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle of one monitor task
///
/// ```text
/// Starting → Running → Stopping → Stopped
/// ```
///
/// `Stopping` is entered as soon as cancellation is raised; `Stopped` only
/// once the loop has observed it and returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl MonitorState {
    pub fn is_live(self) -> bool {
        matches!(self, MonitorState::Starting | MonitorState::Running)
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Starting => write!(f, "starting"),
            MonitorState::Running => write!(f, "running"),
            MonitorState::Stopping => write!(f, "stopping"),
            MonitorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Commands that can be sent to the MetricsReporter
#[derive(Debug)]
pub enum MetricsCommand {
    /// Push the pending latency samples now instead of waiting for the timer
    ///
    /// Responds with the number of gauges pushed.
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    /// Push what is pending, then exit
    ///
    /// Responds with the result of the final push.
    Shutdown {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },
}
