//! Check definitions
//!
//! A [`Check`] is built from one directory subtree of the configuration store:
//!
//! ```text
//! /urlmon/checks/homepage/URL      = https://example.com/
//! /urlmon/checks/homepage/CONTENT  = Welcome
//! /urlmon/checks/homepage/LEVEL    = CRITICAL
//! /urlmon/checks/homepage/INTERVAL = 30
//! ```
//!
//! Checks are immutable once built. A changed definition arrives as a new
//! `Check` in the next generation.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use regex::bytes::Regex;
use serde::Serialize;
use url::Url;

use crate::error::{CheckError, CheckResult};
use crate::probe::Severity;
use crate::store::Node;
use crate::util::{basename, parse_seconds};

/// Base probe interval in seconds when none is configured
pub const DEFAULT_INTERVAL_SECS: u64 = 15;

/// Upper bound of the random jitter in seconds when none is configured
pub const DEFAULT_SPLAY_SECS: u64 = 5;

/// Alert level a check escalates to when its content validation fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    #[default]
    Warn,
    Critical,
}

impl AlertLevel {
    pub fn severity(self) -> Severity {
        match self {
            AlertLevel::Warn => Severity::Warning,
            AlertLevel::Critical => Severity::Critical,
        }
    }
}

impl FromStr for AlertLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WARN" | "WARNING" => Ok(AlertLevel::Warn),
            "CRITICAL" => Ok(AlertLevel::Critical),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Check {
    id: String,
    target: Url,
    content: Option<String>,
    regex: Option<Regex>,
    level: AlertLevel,
    interval: Duration,
    splay: Duration,
}

impl Check {
    /// Create a check with default policy for `target`
    pub fn new(id: impl Into<String>, target: Url) -> Self {
        Self {
            id: id.into(),
            target,
            content: None,
            regex: None,
            level: AlertLevel::default(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            splay: Duration::from_secs(DEFAULT_SPLAY_SECS),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into()).filter(|c: &String| !c.is_empty());
        self
    }

    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn with_level(mut self, level: AlertLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_splay(mut self, splay: Duration) -> Self {
        self.splay = splay;
        self
    }

    /// Build a check from a directory subtree of the configuration store.
    ///
    /// Child keys are matched case-insensitively on their basename; unknown
    /// keys are ignored and empty optional values fall back to defaults.
    pub fn from_node(node: &Node) -> CheckResult<Self> {
        if !node.dir {
            return Err(CheckError::NotADirectory {
                key: node.key.clone(),
            });
        }

        let mut url = None;
        let mut content = None;
        let mut regex = None;
        let mut level = AlertLevel::default();
        let mut interval = None;
        let mut splay = None;

        for child in &node.nodes {
            let value = child.value.as_deref().unwrap_or("").trim();
            match basename(&child.key).to_uppercase().as_str() {
                "URL" if !value.is_empty() => url = Some(parse_target(value)?),
                "CONTENT" if !value.is_empty() => content = Some(value.to_string()),
                "REGEX" if !value.is_empty() => {
                    let compiled =
                        Regex::new(value).map_err(|e| CheckError::InvalidRegex {
                            pattern: value.to_string(),
                            reason: e.to_string(),
                        })?;
                    regex = Some(compiled);
                }
                "LEVEL" => level = value.parse().unwrap_or_default(),
                "INTERVAL" => interval = parse_seconds(value),
                "SPLAY" => splay = parse_seconds(value),
                _ => {}
            }
        }

        let target = url.ok_or(CheckError::MissingUrl)?;

        Ok(Self {
            id: basename(&node.key).to_string(),
            target,
            content,
            regex,
            level,
            interval: Duration::from_secs(interval.unwrap_or(DEFAULT_INTERVAL_SECS)),
            splay: Duration::from_secs(splay.unwrap_or(DEFAULT_SPLAY_SECS)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    pub fn level(&self) -> AlertLevel {
        self.level
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn splay(&self) -> Duration {
        self.splay
    }

    /// Base interval plus a uniform jitter in `[0, splay)`
    pub fn effective_interval(&self) -> Duration {
        self.effective_interval_with(&mut rand::thread_rng())
    }

    pub fn effective_interval_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let splay_nanos = self.splay.as_nanos().min(u64::MAX as u128) as u64;
        if splay_nanos == 0 {
            return self.interval;
        }
        // Saturate instead of overflowing for intervals near the maximum.
        self.interval
            .checked_add(Duration::from_nanos(rng.gen_range(0..splay_nanos)))
            .unwrap_or(self.interval)
    }
}

fn parse_target(value: &str) -> CheckResult<Url> {
    let invalid = |reason: String| CheckError::InvalidUrl {
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
