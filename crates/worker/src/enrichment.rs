//! Enrichment: completes partial records once the detail service is
//! reachable again.
//!
//! Runs on a timer and on demand from the admin surface. Item
//! failures never abort the batch; a record that stays partial is
//! simply picked up by the next run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use feed_core::{IngestOrigin, Killmail, KillmailSummary, Result};
use storage::KillmailRepository;
use telemetry::metrics;

use crate::coordinator::{IngestOutcome, IngestionCoordinator};

const SAMPLE_ERROR_LIMIT: usize = 5;

/// Per-run accounting, returned to the admin caller and logged.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub scanned: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Still irrelevant after full detail arrived, or completed by a
    /// racing feed in the meantime.
    pub skipped: usize,
    /// First few failure messages, for the admin response.
    pub sample_errors: Vec<String>,
}

pub struct EnrichmentJob {
    repository: Arc<dyn KillmailRepository>,
    coordinator: Arc<IngestionCoordinator>,
    batch_limit: usize,
}

impl EnrichmentJob {
    pub fn new(
        repository: Arc<dyn KillmailRepository>,
        coordinator: Arc<IngestionCoordinator>,
        batch_limit: usize,
    ) -> Self {
        Self {
            repository,
            coordinator,
            batch_limit,
        }
    }

    /// One enrichment pass over the oldest partial records.
    pub async fn run(&self) -> Result<EnrichmentReport> {
        let partials = self.repository.find_partial(self.batch_limit).await?;
        metrics().partial_backlog.set(partials.len() as u64);

        let mut report = EnrichmentReport {
            scanned: partials.len(),
            ..Default::default()
        };

        for record in partials {
            let killmail_id = record.killmail_id;
            let summary = match stored_summary(&record) {
                Some(summary) => summary,
                None => {
                    // No hash means the detail service can never be
                    // asked; the record is stuck until re-delivered.
                    report.failed += 1;
                    metrics().enrichment_failures.inc();
                    warn!(killmail_id, "partial record has no hash, cannot enrich");
                    continue;
                }
            };

            match self
                .coordinator
                .ingest_reference(killmail_id, Some(&summary), IngestOrigin::Enrichment)
                .await
            {
                Ok(IngestOutcome::Full) => {
                    report.enriched += 1;
                    metrics().enriched.inc();
                }
                Ok(IngestOutcome::SkippedIrrelevant) => {
                    report.skipped += 1;
                    metrics().enrichment_skipped.inc();
                }
                Ok(IngestOutcome::SkippedDuplicate) => {
                    // Another feed completed it between the scan and
                    // now; nothing left to do.
                    report.skipped += 1;
                }
                Ok(IngestOutcome::Partial) => {
                    // Detail still down; the record stays in the queue.
                    report.failed += 1;
                    metrics().enrichment_failures.inc();
                }
                Err(err) => {
                    report.failed += 1;
                    metrics().enrichment_failures.inc();
                    if report.sample_errors.len() < SAMPLE_ERROR_LIMIT {
                        report.sample_errors.push(format!("{killmail_id}: {err}"));
                    }
                    warn!(killmail_id, error = %err, "enrichment failed");
                }
            }
        }

        info!(
            scanned = report.scanned,
            enriched = report.enriched,
            failed = report.failed,
            skipped = report.skipped,
            "enrichment batch complete"
        );
        Ok(report)
    }
}

/// Rebuilds the index summary from a stored partial so the fetcher
/// can go straight to the detail service.
fn stored_summary(record: &Killmail) -> Option<KillmailSummary> {
    Some(KillmailSummary {
        killmail_id: record.killmail_id,
        hash: record.hash.clone()?,
        total_value: record.total_value,
        points: record.points,
        labels: record.labels.clone(),
    })
}
