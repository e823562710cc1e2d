//! Index service client.
//!
//! The lightweight upstream: killmail summaries (hash, valuation,
//! points, labels) and paginated per-character history. Every call is
//! breaker + retry wrapped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use feed_core::{Error, KillmailSummary, Result, StreamKind};
use telemetry::health;

use crate::breaker::CircuitBreaker;
use crate::config::UpstreamConfig;
use crate::retry::{retry, RetryPolicy};

/// One row of a character's paginated history, newest-first.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub killmail_id: u64,
    pub hash: String,
    pub kill_time: Option<DateTime<Utc>>,
}

/// Seam for the history walk so backfill is testable without HTTP.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetches one page of a character's history. Pages are numbered
    /// from 1; an empty page means the history is exhausted.
    async fn character_history(
        &self,
        character_id: u64,
        kind: StreamKind,
        page: u32,
    ) -> Result<Vec<HistoryEntry>>;
}

/// HTTP client for the index service.
pub struct IndexClient {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl IndexClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::internal(format!("failed to build index client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.index_url.trim_end_matches('/').to_string(),
            breaker: Arc::new(CircuitBreaker::new("index", config.breaker_config())),
            policy: config.retry_policy(),
        })
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// Fetches the hash/valuation summary for one killmail.
    pub async fn summary(&self, killmail_id: u64) -> Result<KillmailSummary> {
        let result = self
            .breaker
            .call(retry(&self.policy, "index", || {
                self.get_summary(killmail_id)
            }))
            .await;
        track_health(&result);
        result
    }

    async fn get_summary(&self, killmail_id: u64) -> Result<KillmailSummary> {
        let url = format!("{}/killmails/{}", self.base_url, killmail_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let response = check_status(response).await?;
        let summary: KillmailSummary = response
            .json()
            .await
            .map_err(|e| Error::invalid_payload(format!("summary decode: {e}")))?;

        debug!(killmail_id, value = summary.total_value, "fetched summary");
        Ok(summary)
    }

    async fn get_history(
        &self,
        character_id: u64,
        kind: StreamKind,
        page: u32,
    ) -> Result<Vec<HistoryEntry>> {
        let url = format!(
            "{}/characters/{}/{}?page={}",
            self.base_url,
            character_id,
            kind.as_str(),
            page
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::invalid_payload(format!("history decode: {e}")))
    }
}

#[async_trait]
impl HistorySource for IndexClient {
    async fn character_history(
        &self,
        character_id: u64,
        kind: StreamKind,
        page: u32,
    ) -> Result<Vec<HistoryEntry>> {
        let result = self
            .breaker
            .call(retry(&self.policy, "index", || {
                self.get_history(character_id, kind, page)
            }))
            .await;
        track_health(&result);
        result
    }
}

/// A 403/404 still means the service answered; only real faults mark
/// the component down.
fn track_health<T>(result: &Result<T>) {
    match result {
        Ok(_) => health().index_service.set_healthy(),
        Err(err) if err.is_client_rejection() => health().index_service.set_healthy(),
        Err(err) => health().index_service.set_unhealthy(err.to_string()),
    }
}

/// Maps non-success statuses into the error taxonomy; the retry
/// classifier decides which statuses are worth another attempt.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::upstream_status(status.as_u16(), body))
}
