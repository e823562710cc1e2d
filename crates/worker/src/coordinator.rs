//! Ingestion coordinator: the single convergence point for all feeds.
//!
//! Every draft, whatever feed produced it, goes through the same
//! sequence: dedup against storage, relevance against the roster,
//! classification, then the atomic write. Origin is threaded
//! explicitly because backfill relevance degenerates to "the subject
//! character is tracked" even when the payload references nobody else
//! on the roster.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use feed_core::{
    Completeness, Error, IngestOrigin, Killmail, KillmailSummary, Loss, Result, TrackedRoster,
};
use storage::KillmailRepository;
use telemetry::{health, metrics};
use upstream::{retry, RecordFetcher, RetryPolicy};

/// What the coordinator did with one draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Full record plus loss views written.
    Full,
    /// Summary-only record written; enrichment will complete it.
    Partial,
    /// A full record already existed for this id.
    SkippedDuplicate,
    /// No tracked character involved.
    SkippedIrrelevant,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::SkippedIrrelevant => "skipped_irrelevant",
        }
    }

}

pub struct IngestionCoordinator {
    repository: Arc<dyn KillmailRepository>,
    fetcher: Arc<dyn RecordFetcher>,
    roster: Arc<TrackedRoster>,
    write_policy: RetryPolicy,
}

impl IngestionCoordinator {
    pub fn new(
        repository: Arc<dyn KillmailRepository>,
        fetcher: Arc<dyn RecordFetcher>,
        roster: Arc<TrackedRoster>,
    ) -> Self {
        Self {
            repository,
            fetcher,
            roster,
            // Writes are local and fast; short, tight retries.
            write_policy: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                attempt_timeout: Duration::from_secs(5),
            },
        }
    }

    /// Ingests a fully-detailed draft.
    pub async fn ingest(&self, draft: Killmail, origin: IngestOrigin) -> Result<IngestOutcome> {
        metrics().events_seen.inc();
        self.ingest_draft(draft, origin).await
    }

    /// Ingests a summary-only draft when detail cannot be fetched.
    pub async fn ingest_partial(
        &self,
        draft: Killmail,
        origin: IngestOrigin,
    ) -> Result<IngestOutcome> {
        metrics().events_seen.inc();
        self.partial_inner(draft, origin).await
    }

    /// Ingests by id: fetches the summary and detail, falling back to
    /// a partial write when only the detail service is down. This is
    /// the path backfill-by-reference and enrichment use.
    pub async fn ingest_reference(
        &self,
        killmail_id: u64,
        known: Option<&KillmailSummary>,
        origin: IngestOrigin,
    ) -> Result<IngestOutcome> {
        metrics().events_seen.inc();

        // Dedup before spending upstream calls.
        if let Some(stored) = self.repository.find_by_event_id(killmail_id).await? {
            if stored.completeness == Completeness::Full {
                metrics().skipped_duplicate.inc();
                debug!(killmail_id, origin = origin.as_str(), "already ingested");
                return Ok(IngestOutcome::SkippedDuplicate);
            }
        }

        let summary = match known {
            Some(summary) => summary.clone(),
            None => self.fetcher.summary(killmail_id).await?,
        };

        match self.fetcher.fetch(killmail_id, Some(&summary)).await {
            Ok(draft) => self.ingest_draft(draft, origin).await,
            Err(Error::DetailUnavailable(reason)) => {
                warn!(
                    killmail_id,
                    origin = origin.as_str(),
                    %reason,
                    "detail service unavailable, storing partial"
                );
                self.partial_inner(summary.into_partial_draft(), origin)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    async fn ingest_draft(&self, mut draft: Killmail, origin: IngestOrigin) -> Result<IngestOutcome> {
        let killmail_id = draft.killmail_id;

        if let Some(stored) = self.repository.find_by_event_id(killmail_id).await? {
            if stored.completeness == Completeness::Full {
                metrics().skipped_duplicate.inc();
                debug!(killmail_id, origin = origin.as_str(), "already ingested");
                return Ok(IngestOutcome::SkippedDuplicate);
            }
            // Partial on file: the full draft upgrades it in place.
        }

        if !self.is_relevant(&draft, origin) {
            metrics().skipped_irrelevant.inc();
            debug!(killmail_id, origin = origin.as_str(), "no tracked character involved");
            return Ok(IngestOutcome::SkippedIrrelevant);
        }

        draft.classify();

        let losses: Vec<Loss> = draft
            .victim
            .character_id
            .filter(|id| self.roster.contains(*id))
            .map(|id| Loss::derive(&draft, id))
            .into_iter()
            .collect();

        self.write(|| self.repository.upsert_full(&draft, &losses))
            .await?;

        metrics().ingested_full.inc();
        debug!(
            killmail_id,
            origin = origin.as_str(),
            losses = losses.len(),
            value = draft.total_value,
            "ingested full record"
        );
        Ok(IngestOutcome::Full)
    }

    async fn partial_inner(&self, draft: Killmail, origin: IngestOrigin) -> Result<IngestOutcome> {
        let killmail_id = draft.killmail_id;

        // A full record wins over any partial rewrite. An existing
        // partial is rewritten; upsert_partial is idempotent.
        if let Some(stored) = self.repository.find_by_event_id(killmail_id).await? {
            if stored.completeness == Completeness::Full {
                metrics().skipped_duplicate.inc();
                return Ok(IngestOutcome::SkippedDuplicate);
            }
        }

        if !self.is_relevant_lenient(&draft, origin) {
            metrics().skipped_irrelevant.inc();
            return Ok(IngestOutcome::SkippedIrrelevant);
        }

        self.write(|| self.repository.upsert_partial(&draft)).await?;

        metrics().ingested_partial.inc();
        debug!(killmail_id, origin = origin.as_str(), "ingested partial record");
        Ok(IngestOutcome::Partial)
    }

    /// Full-draft relevance: some referenced character is tracked.
    /// Backfill asks a narrower question, whether its subject is still
    /// tracked, because history pages are already per-character.
    fn is_relevant(&self, draft: &Killmail, origin: IngestOrigin) -> bool {
        match origin {
            IngestOrigin::Backfill { character_id } => self.roster.contains(character_id),
            IngestOrigin::Realtime | IngestOrigin::Enrichment => draft
                .involved_character_ids()
                .iter()
                .any(|id| self.roster.contains(*id)),
        }
    }

    /// Partial drafts built from a summary reference nobody, so an
    /// empty id set cannot prove irrelevance. Keep the event;
    /// enrichment re-checks once the detail arrives.
    fn is_relevant_lenient(&self, draft: &Killmail, origin: IngestOrigin) -> bool {
        match origin {
            IngestOrigin::Backfill { character_id } => self.roster.contains(character_id),
            IngestOrigin::Realtime | IngestOrigin::Enrichment => {
                let ids = draft.involved_character_ids();
                ids.is_empty() || ids.iter().any(|id| self.roster.contains(*id))
            }
        }
    }

    /// Runs a storage write under the write retry policy. An exhausted
    /// write aborts the current item with storage untouched; nothing
    /// here half-applies.
    async fn write<F, Fut>(&self, op: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let start = Instant::now();
        let result = retry(&self.write_policy, "storage", op).await;
        metrics()
            .write_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        match result {
            Ok(()) => {
                health().storage.set_healthy();
                Ok(())
            }
            Err(err) => {
                metrics().persistence_failures.inc();
                metrics().ingest_failures.inc();
                health().storage.set_unhealthy(err.to_string());
                Err(err)
            }
        }
    }
}
