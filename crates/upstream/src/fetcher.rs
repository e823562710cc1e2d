//! Record fetcher: merges index summary and detail payload into one
//! canonical draft.
//!
//! Failures surface distinctly so the coordinator can decide "skip
//! for now" (index down: the event cannot even be identified) versus
//! "store partial, enrich later" (detail down: the summary is enough
//! to not lose the event).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use telemetry::metrics;

use feed_core::{Error, Killmail, KillmailSummary, Result};

use crate::detail::DetailClient;
use crate::index::IndexClient;

/// Seam between the feeds and the HTTP clients; mocked in tests.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Builds a full draft for `killmail_id`. Pass the summary when a
    /// feed already delivered it (enrichment re-uses the stored one)
    /// to skip the index call.
    async fn fetch(&self, killmail_id: u64, known: Option<&KillmailSummary>) -> Result<Killmail>;

    /// The index summary alone. The coordinator falls back to this
    /// when the detail service is down, so the event can still be
    /// written as a partial record.
    async fn summary(&self, killmail_id: u64) -> Result<KillmailSummary>;
}

/// Production fetcher over the two HTTP clients.
pub struct HttpRecordFetcher {
    index: Arc<IndexClient>,
    detail: Arc<DetailClient>,
}

impl HttpRecordFetcher {
    pub fn new(index: Arc<IndexClient>, detail: Arc<DetailClient>) -> Self {
        Self { index, detail }
    }
}

#[async_trait]
impl RecordFetcher for HttpRecordFetcher {
    async fn fetch(&self, killmail_id: u64, known: Option<&KillmailSummary>) -> Result<Killmail> {
        let start = Instant::now();

        let summary = match known {
            Some(summary) => summary.clone(),
            None => self
                .index
                .summary(killmail_id)
                .await
                .map_err(index_failure)?,
        };

        let detail = self
            .detail
            .detail(killmail_id, &summary.hash)
            .await
            .map_err(detail_failure)?;

        metrics()
            .fetch_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        Ok(Killmail {
            killmail_id,
            kill_time: detail.killmail_time,
            solar_system_id: detail.solar_system_id,
            victim: detail.victim,
            attackers: detail.attackers,
            hash: Some(summary.hash),
            total_value: summary.total_value,
            points: summary.points,
            labels: summary.labels,
            is_npc: false,
            is_solo: false,
            is_awox: false,
        })
    }

    async fn summary(&self, killmail_id: u64) -> Result<KillmailSummary> {
        self.index.summary(killmail_id).await.map_err(index_failure)
    }
}

fn index_failure(err: Error) -> Error {
    match err {
        Error::InvalidPayload(_) => err,
        other => Error::IndexUnavailable(other.to_string()),
    }
}

fn detail_failure(err: Error) -> Error {
    match err {
        Error::InvalidPayload(_) => err,
        other => Error::DetailUnavailable(other.to_string()),
    }
}
