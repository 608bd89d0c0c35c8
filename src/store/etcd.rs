//! etcd v2 keys API client
//!
//! Snapshots are plain recursive GETs. Watching is a long-poll loop running
//! in its own task: each `?wait=true` request returns one change, which is
//! forwarded to the subscriber before the next request is issued with the
//! following `waitIndex`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::error::{StoreError, StoreResult};
use super::{ChangeEvent, ConfigStore, Node, WATCH_CHANNEL_CAPACITY, normalize_key};
use crate::util::split_list;

/// Timeout for snapshot and directory requests (watch requests have none)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before re-issuing a watch request that failed
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// etcd error code for "the event in requested index is outdated and cleared"
const ERROR_INDEX_CLEARED: u64 = 401;

/// etcd error code for "key already exists"
const ERROR_NODE_EXIST: u64 = 105;

const INDEX_HEADER: &str = "X-Etcd-Index";

#[derive(Debug, Deserialize)]
struct KeysResponse {
    action: String,
    node: Option<Node>,
}

#[derive(Debug, Deserialize)]
struct WatchResponse {
    action: String,
    node: WatchNode,
}

#[derive(Debug, Deserialize)]
struct WatchNode {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(rename = "modifiedIndex")]
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "errorCode")]
    error_code: u64,
    message: String,
    #[serde(default)]
    cause: Option<String>,
}

enum WatchOutcome {
    Changed { event: ChangeEvent, index: u64 },
    IndexCleared,
    Idle,
}

/// Client for one etcd cluster, trying each endpoint in order
#[derive(Debug, Clone)]
pub struct EtcdStore {
    endpoints: Vec<String>,
    client: reqwest::Client,
    watch_client: reqwest::Client,
}

impl EtcdStore {
    /// Create a client from a comma separated list of endpoint URLs
    pub fn new(endpoints: &str) -> StoreResult<Self> {
        let endpoints = split_list(endpoints)
            .into_iter()
            .map(|endpoint| {
                Url::parse(&endpoint)
                    .map(|_| endpoint.trim_end_matches('/').to_string())
                    .map_err(|e| StoreError::Protocol(format!("invalid endpoint '{endpoint}': {e}")))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        if endpoints.is_empty() {
            return Err(StoreError::Protocol("no etcd endpoints configured".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        let watch_client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        Ok(Self {
            endpoints,
            client,
            watch_client,
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn keys_url(endpoint: &str, path: &str) -> String {
        format!("{endpoint}/v2/keys{}", normalize_key(path))
    }

    /// Send a request to the first endpoint that answers at all
    async fn request(
        &self,
        client: &reqwest::Client,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Response> {
        let mut last_error = StoreError::Unreachable("no endpoint tried".to_string());

        for endpoint in &self.endpoints {
            let url = Self::keys_url(endpoint, path);
            trace!("{method} {url}");
            match client.request(method.clone(), &url).query(query).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!("etcd endpoint {endpoint} failed: {e}");
                    last_error = StoreError::Unreachable(format!("{endpoint}: {e}"));
                }
            }
        }

        Err(last_error)
    }

    /// Index the cluster reported for this response, if any
    fn etcd_index(response: &Response) -> Option<u64> {
        response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }

    async fn error_from(path: &str, response: Response) -> StoreError {
        let status = response.status();
        match response.json::<ErrorResponse>().await {
            Ok(err) if status == StatusCode::NOT_FOUND => {
                StoreError::NotFound(err.cause.unwrap_or_else(|| normalize_key(path)))
            }
            Ok(err) => StoreError::Protocol(format!("{} (code {})", err.message, err.error_code)),
            Err(_) if status == StatusCode::NOT_FOUND => StoreError::NotFound(normalize_key(path)),
            Err(e) => StoreError::Protocol(format!("unexpected status {status}: {e}")),
        }
    }

    async fn wait_for_change(&self, prefix: &str, wait_index: u64) -> StoreResult<WatchOutcome> {
        let query = [
            ("wait", "true".to_string()),
            ("recursive", "true".to_string()),
            ("waitIndex", wait_index.to_string()),
        ];
        let response = self
            .request(&self.watch_client, Method::GET, prefix, &query)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return match response.json::<ErrorResponse>().await {
                Ok(err) if err.error_code == ERROR_INDEX_CLEARED => Ok(WatchOutcome::IndexCleared),
                Ok(err) => Err(StoreError::Protocol(format!(
                    "{} (code {})",
                    err.message, err.error_code
                ))),
                Err(e) => Err(StoreError::Protocol(format!("unexpected status {status}: {e}"))),
            };
        }

        // etcd closes an idle long poll with an empty body
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(WatchOutcome::Idle);
        }

        let change: WatchResponse =
            serde_json::from_slice(&body).map_err(|e| StoreError::Protocol(e.to_string()))?;

        Ok(WatchOutcome::Changed {
            index: change.node.modified_index,
            event: ChangeEvent {
                action: change.action,
                key: change.node.key,
                value: change.node.value,
            },
        })
    }

    /// Current cluster index for `prefix`, used to start a watch without gaps
    async fn current_index(&self, prefix: &str) -> StoreResult<u64> {
        let response = self
            .request(&self.client, Method::GET, prefix, &[])
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(prefix, response).await);
        }

        Self::etcd_index(&response)
            .ok_or_else(|| StoreError::Protocol(format!("missing {INDEX_HEADER} header")))
    }

    #[instrument(skip(self, tx))]
    async fn watch_loop(self, prefix: String, start_index: u64, tx: mpsc::Sender<ChangeEvent>) {
        let mut wait_index = start_index;

        loop {
            let outcome = tokio::select! {
                outcome = self.wait_for_change(&prefix, wait_index) => outcome,
                _ = tx.closed() => {
                    debug!("watch subscriber gone, stopping");
                    return;
                }
            };

            match outcome {
                Ok(WatchOutcome::Changed { event, index }) => {
                    wait_index = index + 1;
                    if tx.send(event).await.is_err() {
                        debug!("watch subscriber gone, stopping");
                        return;
                    }
                }
                Ok(WatchOutcome::IndexCleared) => {
                    warn!("watch index {wait_index} was cleared, resynchronising");
                    match self.current_index(&prefix).await {
                        Ok(index) => {
                            wait_index = index + 1;
                            // Changes may have been missed, force a reload.
                            let event = ChangeEvent {
                                action: "resync".to_string(),
                                key: prefix.clone(),
                                value: None,
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("failed to resynchronise watch: {e}");
                            tokio::time::sleep(WATCH_RETRY_DELAY).await;
                        }
                    }
                }
                Ok(WatchOutcome::Idle) => {}
                Err(e) => {
                    warn!("watch request failed: {e}");
                    tokio::time::sleep(WATCH_RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl ConfigStore for EtcdStore {
    #[instrument(skip(self))]
    async fn fetch_snapshot(&self, path: &str) -> StoreResult<Node> {
        let query = [
            ("recursive", "true".to_string()),
            ("sorted", "true".to_string()),
        ];
        let response = self
            .request(&self.client, Method::GET, path, &query)
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(path, response).await);
        }

        let body: KeysResponse = response.json().await?;
        trace!("fetched snapshot ({})", body.action);

        body.node
            .ok_or_else(|| StoreError::Protocol("response without node".to_string()))
    }

    async fn watch(&self, prefix: &str) -> StoreResult<mpsc::Receiver<ChangeEvent>> {
        let prefix = normalize_key(prefix);
        let start_index = self.current_index(&prefix).await? + 1;
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        debug!("watching {prefix} from index {start_index}");
        tokio::spawn(self.clone().watch_loop(prefix, start_index, tx));

        Ok(rx)
    }

    async fn ensure_dirs(&self, dirs: &[String]) -> StoreResult<()> {
        for dir in dirs {
            let response = self.request(&self.client, Method::GET, dir, &[]).await?;
            if response.status().is_success() {
                continue;
            }
            match Self::error_from(dir, response).await {
                StoreError::NotFound(_) => {}
                other => return Err(other),
            }

            info!("creating dir in etcd: {dir}");
            let response = self
                .request(&self.client, Method::PUT, dir, &[("dir", "true".to_string())])
                .await?;
            if response.status().is_success() {
                continue;
            }

            let status = response.status();
            match response.json::<ErrorResponse>().await {
                // Someone else created it in the meantime.
                Ok(err) if err.error_code == ERROR_NODE_EXIST => {}
                Ok(err) => {
                    return Err(StoreError::Protocol(format!(
                        "couldn't create {dir}: {} (code {})",
                        err.message, err.error_code
                    )));
                }
                Err(_) => {
                    return Err(StoreError::Protocol(format!(
                        "couldn't create {dir}: status {status}"
                    )));
                }
            }
        }

        Ok(())
    }
}
