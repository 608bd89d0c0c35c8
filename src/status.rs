//! Status snapshot and generation views
//!
//! Every generation owns one [`StatusSnapshot`] holding an entry per check
//! id. The id set is fixed when the snapshot is built; each entry has its own
//! lock so monitors writing distinct ids never contend. Swapping in the next
//! generation replaces the whole [`Generation`] behind [`CurrentGeneration`],
//! so readers see either the old or the new snapshot, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::actors::messages::CheckEvent;
use crate::check::Check;
use crate::probe::Severity;

/// Last known result for one check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckStatus {
    /// `None` until the first probe completes
    pub status: Option<Severity>,
    pub message: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct StatusSnapshot {
    entries: HashMap<String, RwLock<CheckStatus>>,
}

impl StatusSnapshot {
    /// Create a snapshot with an empty entry for each id
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: ids
                .into_iter()
                .map(|id| (id.into(), RwLock::new(CheckStatus::default())))
                .collect(),
        }
    }

    /// Store the event's outcome; returns `false` for ids not in this snapshot
    pub async fn record(&self, event: &CheckEvent) -> bool {
        let Some(entry) = self.entries.get(&event.check_id) else {
            return false;
        };

        let mut status = entry.write().await;
        status.status = Some(event.severity);
        status.message = Some(event.message.clone());
        status.last_checked = Some(event.timestamp);
        true
    }

    pub async fn get(&self, id: &str) -> Option<CheckStatus> {
        match self.entries.get(id) {
            Some(entry) => Some(entry.read().await.clone()),
            None => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Ids in this snapshot, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One generation: the checks being monitored and their status snapshot
#[derive(Debug, Default)]
pub struct Generation {
    number: u64,
    checks: Vec<Arc<Check>>,
    snapshot: Arc<StatusSnapshot>,
}

impl Generation {
    pub fn new(number: u64, checks: Vec<Arc<Check>>, snapshot: Arc<StatusSnapshot>) -> Self {
        Self {
            number,
            checks,
            snapshot,
        }
    }

    /// Sequence number, starting at 1 for the first loaded generation
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn checks(&self) -> &[Arc<Check>] {
        &self.checks
    }

    pub fn check(&self, id: &str) -> Option<&Arc<Check>> {
        self.checks.iter().find(|check| check.id() == id)
    }

    pub fn snapshot(&self) -> &Arc<StatusSnapshot> {
        &self.snapshot
    }
}

/// Shared pointer to the generation that is current right now
///
/// Owned by the generation manager and handed to the status surface.
#[derive(Debug, Clone, Default)]
pub struct CurrentGeneration {
    inner: Arc<RwLock<Arc<Generation>>>,
}

impl CurrentGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self) -> Arc<Generation> {
        self.inner.read().await.clone()
    }

    pub(crate) async fn publish(&self, generation: Arc<Generation>) {
        *self.inner.write().await = generation;
    }
}
