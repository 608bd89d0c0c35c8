//! Configuration store access
//!
//! Check definitions live in a hierarchical key/value store. The monitor only
//! needs two things from it: a full snapshot of the checks subtree, and a
//! stream telling it that *something* under the prefix changed. Changes are
//! never applied incrementally; every notification triggers a full re-fetch.
//!
//! ## Implementations
//!
//! - **etcd** ([`etcd::EtcdStore`]): the v2 keys API over HTTP
//! - **In-Memory** ([`memory::MemoryStore`]): settable tree, for tests and embedding

pub mod error;
pub mod etcd;
pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

pub use error::{StoreError, StoreResult};

/// One node of the key/value tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Node {
    pub key: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub dir: bool,

    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Node {
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            dir: false,
            nodes: Vec::new(),
        }
    }

    pub fn dir(key: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            value: None,
            dir: true,
            nodes,
        }
    }
}

/// Notification that something under the watched prefix changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub action: String,
    pub key: String,
    pub value: Option<String>,
}

/// Capacity of the change notification channel handed out by [`ConfigStore::watch`]
pub const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Access to the store holding check definitions
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the full subtree rooted at `path`
    async fn fetch_snapshot(&self, path: &str) -> StoreResult<Node>;

    /// Subscribe to recursive change notifications under `prefix`.
    ///
    /// The stream ends when the store gives up on the watch or the receiver
    /// is dropped.
    async fn watch(&self, prefix: &str) -> StoreResult<mpsc::Receiver<ChangeEvent>>;

    /// Make sure each path in `dirs` exists as a directory
    async fn ensure_dirs(&self, dirs: &[String]) -> StoreResult<()>;
}

/// Key path of the checks directory for a prefix (`urlmon` → `/urlmon/checks`)
pub fn checks_path(prefix: &str) -> String {
    format!("{}/checks", normalize_key(prefix))
}

/// Absolute key path without a trailing slash
pub fn normalize_key(key: &str) -> String {
    format!("/{}", key.trim_matches('/'))
}
