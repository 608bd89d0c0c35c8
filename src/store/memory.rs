//! In-memory configuration store
//!
//! Holds one subtree per path and notifies watchers whenever a subtree is
//! replaced. Useful for:
//! - Testing reload behaviour without an etcd cluster
//! - Embedding the monitor with a programmatic check set
//!
//! An outage can be simulated with [`MemoryStore::set_reachable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::{ChangeEvent, ConfigStore, Node, WATCH_CHANNEL_CAPACITY, normalize_key};

#[derive(Debug)]
pub struct MemoryStore {
    /// Subtrees keyed by normalized path
    subtrees: RwLock<HashMap<String, Node>>,

    /// Watchers as (prefix, sender)
    watchers: RwLock<Vec<(String, mpsc::Sender<ChangeEvent>)>>,

    reachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            subtrees: RwLock::new(HashMap::new()),
            watchers: RwLock::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Replace the subtree at `path` and notify watchers of its prefixes
    pub async fn put(&self, path: &str, node: Node) {
        let path = normalize_key(path);
        self.subtrees.write().await.insert(path.clone(), node);
        self.notify(&path, "set").await;
    }

    /// Remove the subtree at `path` and notify watchers of its prefixes
    pub async fn delete(&self, path: &str) {
        let path = normalize_key(path);
        self.subtrees.write().await.remove(&path);
        self.notify(&path, "delete").await;
    }

    /// Toggle simulated reachability; an unreachable store fails every call
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Send a change notification for `key` without touching any subtree
    pub async fn notify(&self, key: &str, action: &str) {
        let key = normalize_key(key);
        let mut watchers = self.watchers.write().await;

        // Drop watchers whose receiver is gone.
        watchers.retain(|(_, tx)| !tx.is_closed());

        for (prefix, tx) in watchers.iter() {
            if key == *prefix || key.starts_with(&format!("{prefix}/")) {
                let event = ChangeEvent {
                    action: action.to_string(),
                    key: key.clone(),
                    value: None,
                };
                if tx.try_send(event).is_err() {
                    debug!("watcher for {prefix} is full, dropping notification");
                }
            }
        }
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn fetch_snapshot(&self, path: &str) -> StoreResult<Node> {
        self.check_reachable()?;

        let path = normalize_key(path);
        self.subtrees
            .read()
            .await
            .get(&path)
            .cloned()
            .ok_or(StoreError::NotFound(path))
    }

    async fn watch(&self, prefix: &str) -> StoreResult<mpsc::Receiver<ChangeEvent>> {
        self.check_reachable()?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        self.watchers.write().await.push((normalize_key(prefix), tx));
        Ok(rx)
    }

    async fn ensure_dirs(&self, dirs: &[String]) -> StoreResult<()> {
        self.check_reachable()?;

        let mut subtrees = self.subtrees.write().await;
        for dir in dirs {
            let path = normalize_key(dir);
            subtrees
                .entry(path.clone())
                .or_insert_with(|| Node::dir(path, Vec::new()));
        }
        Ok(())
    }
}
