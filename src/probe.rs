//! Probe execution and response validation
//!
//! [`validate`] is a pure function of a check and a received response.
//! Transport failures never reach it: [`execute`] reports them directly as
//! [`Severity::Critical`], whatever the check's configured alert level.

use std::fmt::Display;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::{Serialize, Serializer};
use tracing::{instrument, trace};

use crate::check::Check;

pub const CONTENT_MISMATCH: &str = "Content match failed";
pub const REGEX_MISMATCH: &str = "Content regex did not match";

/// Numeric status code understood by the alert sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl Severity {
    pub fn code(self) -> u8 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Severity::Ok
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Classified result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub severity: Severity,
    pub message: String,
}

impl ProbeOutcome {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Outcome for a request that never produced a response
    pub fn transport_failure(err: impl Display) -> Self {
        Self::new(Severity::Critical, err.to_string())
    }
}

/// Validate a received response against the check's content rules.
///
/// `status` only feeds the success message; any HTTP status is accepted.
pub fn validate<B, E>(check: &Check, status: StatusCode, body: Result<B, E>) -> ProbeOutcome
where
    B: AsRef<[u8]>,
    E: Display,
{
    let failure = check.level().severity();

    let body = match body {
        Ok(body) => body,
        Err(e) => return ProbeOutcome::new(failure, format!("Error reading response: {e}")),
    };
    let body = body.as_ref();

    if let Some(content) = check.content()
        && !contains(body, content.as_bytes())
    {
        return ProbeOutcome::new(failure, CONTENT_MISMATCH);
    }

    if let Some(regex) = check.regex()
        && !regex.is_match(body)
    {
        return ProbeOutcome::new(failure, REGEX_MISMATCH);
    }

    ProbeOutcome::new(Severity::Ok, status.to_string())
}

/// Byte substring search; bodies need not be valid UTF-8
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Issue one GET against the check's target and classify the result.
///
/// Returns the outcome together with the elapsed wall-clock time. The request
/// is bounded by the check's base interval.
#[instrument(skip_all, fields(check = %check.id()))]
pub async fn execute(client: &reqwest::Client, check: &Check) -> (ProbeOutcome, Duration) {
    trace!("probing {}", check.target());

    let start = Instant::now();
    let response = client
        .get(check.target().clone())
        .timeout(check.interval())
        .send()
        .await;

    let outcome = match response {
        Ok(response) => {
            let status = response.status();
            validate(check, status, response.bytes().await)
        }
        Err(e) => ProbeOutcome::transport_failure(e),
    };

    (outcome, start.elapsed())
}
