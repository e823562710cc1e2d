//! Long-poll queue client.
//!
//! A shared broadcast queue: `GET <endpoint>?wait=<secs>` blocks
//! server-side until an item arrives or the wait elapses. Items are
//! not assigned per client, so missed deliveries during downtime are
//! expected and recovered by backfill; no checkpoint is kept.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use feed_core::{Error, Killmail, Result};

use crate::config::UpstreamConfig;
use crate::index::check_status;

/// Seam for the long-poll loop; mocked in tests.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// One long-poll cycle. `Ok(None)` means the server-side wait
    /// elapsed with nothing to deliver.
    async fn poll(&self) -> Result<Option<Killmail>>;
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    item: Option<Killmail>,
}

/// HTTP long-poll client.
pub struct HttpQueueClient {
    http: reqwest::Client,
    endpoint: String,
    wait_secs: u64,
}

impl HttpQueueClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        // The client timeout must outlive the server-side wait.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.queue_wait_secs + 5))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::internal(format!("failed to build queue client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.queue_url.clone(),
            wait_secs: config.queue_wait_secs,
        })
    }
}

#[async_trait]
impl QueueSource for HttpQueueClient {
    async fn poll(&self) -> Result<Option<Killmail>> {
        let url = format!("{}?wait={}", self.endpoint, self.wait_secs);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let response = check_status(response).await?;
        let body: QueueResponse = response
            .json()
            .await
            .map_err(|e| Error::invalid_payload(format!("queue item decode: {e}")))?;

        if let Some(ref item) = body.item {
            debug!(killmail_id = item.killmail_id, "queue delivered item");
        }
        Ok(body.item)
    }
}
