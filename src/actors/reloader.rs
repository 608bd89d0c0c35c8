//! Reload loop - Turns store change notifications into generation reloads
//!
//! ```text
//! ChangeEvent → coalesce queued events → fetch full snapshot → GenerationManager::reload
//! ```
//!
//! A failed fetch leaves the current generation running untouched.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use super::manager::GenerationManager;
use crate::status::Generation;
use crate::store::{ChangeEvent, ConfigStore, StoreResult};

/// Fetch the checks subtree at `path` and make it the current generation
pub async fn reload_from_store(
    store: &dyn ConfigStore,
    manager: &GenerationManager,
    path: &str,
) -> StoreResult<Arc<Generation>> {
    let root = store.fetch_snapshot(path).await?;
    Ok(manager.reload(&root).await)
}

/// Reload on every change notification until the stream ends
#[instrument(skip(store, manager, changes))]
pub async fn run_reload_loop(
    store: Arc<dyn ConfigStore>,
    manager: Arc<GenerationManager>,
    path: String,
    mut changes: mpsc::Receiver<ChangeEvent>,
) {
    while let Some(change) = changes.recv().await {
        info!(
            "reloading checks, triggered by '{}' on '{}' with value: '{}'",
            change.action,
            change.key,
            change.value.as_deref().unwrap_or("")
        );

        let mut coalesced = 0;
        while changes.try_recv().is_ok() {
            coalesced += 1;
        }
        if coalesced > 0 {
            debug!("coalesced {coalesced} further notifications into this reload");
        }

        if let Err(e) = reload_from_store(store.as_ref(), &manager, &path).await {
            error!("problem fetching checks, keeping current generation: {e}");
        }
    }

    info!("change notifications ended, reload loop stopped");
}
