//! Status surface response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::check::{AlertLevel, Check};
use crate::probe::Severity;
use crate::status::CheckStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    /// Number of the current generation, 0 before the first load
    pub generation: u64,

    /// Checks monitored by the current generation
    pub checks: usize,

    pub timestamp: DateTime<Utc>,
}

/// One check of the current generation with its last known result
#[derive(Debug, Clone, Serialize)]
pub struct CheckInfo {
    pub id: String,
    pub url: String,
    pub level: AlertLevel,

    /// Base interval in seconds
    pub interval: u64,

    /// Jitter upper bound in seconds
    pub splay: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Numeric severity of the last probe, `null` before the first one
    pub status: Option<Severity>,
    pub message: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl CheckInfo {
    pub fn new(check: &Check, status: CheckStatus) -> Self {
        Self {
            id: check.id().to_string(),
            url: check.target().to_string(),
            level: check.level(),
            interval: check.interval().as_secs(),
            splay: check.splay().as_secs(),
            content: check.content().map(String::from),
            regex: check.regex().map(|r| r.as_str().to_string()),
            status: status.status,
            message: status.message,
            last_checked: status.last_checked,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub generation: u64,
    pub checkdata: Vec<CheckInfo>,
}
