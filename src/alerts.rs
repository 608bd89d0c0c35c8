//! Alert delivery
//!
//! Monitors hand every classified outcome to an [`AlertSink`]. Delivery is
//! best effort: a failed send is logged and dropped, never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{error, instrument, trace};

use crate::actors::messages::CheckEvent;

/// Upper bound for connecting to and writing into the sensu client socket
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &CheckEvent);
}

/// Event understood by the sensu client socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensuEvent {
    pub name: String,
    pub handlers: Vec<String>,
    pub output: String,
    pub status: u8,
}

impl SensuEvent {
    pub fn from_check_event(event: &CheckEvent, handlers: &[String]) -> Self {
        Self {
            name: event.check_id.clone(),
            handlers: handlers.to_vec(),
            output: format!("{}::{}", event.message, event.url),
            status: event.severity.code(),
        }
    }
}

/// Sends events as JSON to a local sensu client over TCP, one connection per event
#[derive(Debug, Clone)]
pub struct SensuSink {
    addr: String,
    handlers: Vec<String>,
}

impl SensuSink {
    pub fn new(addr: impl Into<String>, handlers: Vec<String>) -> Self {
        Self {
            addr: addr.into(),
            handlers,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn deliver(&self, payload: &[u8]) -> std::io::Result<()> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(payload).await?;
        stream.shutdown().await
    }
}

#[async_trait]
impl AlertSink for SensuSink {
    #[instrument(skip_all, fields(check = %event.check_id))]
    async fn send(&self, event: &CheckEvent) {
        let sensu_event = SensuEvent::from_check_event(event, &self.handlers);

        let payload = match serde_json::to_vec(&sensu_event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("error marshaling event data: {e}");
                return;
            }
        };

        match timeout(SEND_TIMEOUT, self.deliver(&payload)).await {
            Ok(Ok(())) => trace!("delivered event to sensu at {}", self.addr),
            Ok(Err(e)) => error!("error sending event to sensu client at {}: {e}", self.addr),
            Err(_) => error!("timed out sending event to sensu client at {}", self.addr),
        }
    }
}
