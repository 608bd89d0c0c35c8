//! GenerationManager - Owns the live set of monitors
//!
//! A reload always replaces the whole generation:
//!
//! ```text
//! reload(tree) → cancel every live monitor → join them all → parse checks
//!              → fresh snapshot → spawn one monitor per check → publish
//! ```
//!
//! Draining before spawning keeps two monitors for the same id from ever
//! running together, and keeps stopped monitors from writing into a snapshot
//! their generation no longer owns. Reloads are serialized by the lock on
//! the live monitor set; a reload arriving mid-drain waits its turn.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use super::messages::MonitorState;
use super::monitor::{MonitorContext, MonitorHandle};
use crate::check::Check;
use crate::status::{CurrentGeneration, Generation, StatusSnapshot};
use crate::store::Node;

pub struct GenerationManager {
    context: MonitorContext,

    current: CurrentGeneration,

    /// Monitors of the current generation; held for the whole of a reload
    live: Mutex<Vec<MonitorHandle>>,
}

impl GenerationManager {
    pub fn new(context: MonitorContext) -> Self {
        Self {
            context,
            current: CurrentGeneration::new(),
            live: Mutex::new(Vec::new()),
        }
    }

    /// Shared view of the current generation, for the status surface
    pub fn current(&self) -> CurrentGeneration {
        self.current.clone()
    }

    /// Replace the current generation with one built from `root`.
    ///
    /// `root` is the checks directory; each child directory is one check.
    #[instrument(skip_all, fields(root = %root.key))]
    pub async fn reload(&self, root: &Node) -> Arc<Generation> {
        let mut live = self.live.lock().await;
        drain(&mut live).await;

        let checks = load_checks(root);
        self.start_generation(&mut live, checks).await
    }

    /// Replace the current generation with already built checks
    #[instrument(skip_all, fields(checks = checks.len()))]
    pub async fn reload_checks(&self, checks: Vec<Check>) -> Arc<Generation> {
        let mut live = self.live.lock().await;
        drain(&mut live).await;

        self.start_generation(&mut live, retain_unique(checks)).await
    }

    /// Spawn one monitor per check into `live` and publish the new generation
    async fn start_generation(
        &self,
        live: &mut Vec<MonitorHandle>,
        checks: Vec<Check>,
    ) -> Arc<Generation> {
        let checks: Vec<Arc<Check>> = checks.into_iter().map(Arc::new).collect();
        let snapshot = Arc::new(StatusSnapshot::new(checks.iter().map(|c| c.id())));
        let number = self.current.load().await.number() + 1;

        for check in &checks {
            live.push(MonitorHandle::spawn(
                check.clone(),
                snapshot.clone(),
                &self.context,
            ));
        }

        let generation = Arc::new(Generation::new(number, checks, snapshot));
        self.current.publish(generation.clone()).await;

        info!(
            "generation {number} running with {} checks",
            generation.checks().len()
        );
        generation
    }

    /// Stop every monitor of the current generation and wait for them.
    ///
    /// The last snapshot stays readable.
    pub async fn shutdown(&self) {
        let mut live = self.live.lock().await;
        drain(&mut live).await;
        info!("all monitors stopped");
    }

    /// Lifecycle state of every live monitor, sorted by id
    pub async fn monitor_states(&self) -> Vec<(String, MonitorState)> {
        let live = self.live.lock().await;
        let mut states: Vec<_> = live
            .iter()
            .map(|handle| (handle.check_id().to_string(), handle.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Receivers following the lifecycle of every live monitor
    pub async fn watch_states(&self) -> Vec<(String, watch::Receiver<MonitorState>)> {
        let live = self.live.lock().await;
        live.iter()
            .map(|handle| (handle.check_id().to_string(), handle.subscribe()))
            .collect()
    }
}

/// Cancel every monitor, then wait until all of them have exited
async fn drain(live: &mut Vec<MonitorHandle>) {
    if live.is_empty() {
        return;
    }

    debug!("draining {} monitors", live.len());
    for handle in live.iter() {
        debug!("shutting down {}", handle.check_id());
        handle.cancel();
    }

    join_all(live.drain(..).map(MonitorHandle::join)).await;
}

/// Parse the children of the checks directory into checks.
///
/// Entries that fail to build are logged and skipped; they never prevent the
/// remaining entries from loading.
pub fn load_checks(root: &Node) -> Vec<Check> {
    if !root.dir {
        warn!("{} is not a directory, no checks loaded", root.key);
        return Vec::new();
    }

    let mut checks = Vec::with_capacity(root.nodes.len());
    for node in &root.nodes {
        match Check::from_node(node) {
            Ok(check) => {
                debug!("loaded {}: {}", node.key, check.target());
                checks.push(check);
            }
            Err(e) => warn!("failed to create check, skipping {}: {e}", node.key),
        }
    }

    retain_unique(checks)
}

/// Keep the first check for every id
fn retain_unique(checks: Vec<Check>) -> Vec<Check> {
    let mut seen = HashSet::new();
    checks
        .into_iter()
        .filter(|check| {
            let first = seen.insert(check.id().to_string());
            if !first {
                warn!("duplicate check id {}, skipping {}", check.id(), check.target());
            }
            first
        })
        .collect()
}
