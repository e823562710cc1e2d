//! Backfill: checkpointed per-character history catch-up.
//!
//! Walks each tracked character's kill and loss history newest-first,
//! fetching and ingesting everything newer than the stream checkpoint
//! and younger than the age cutoff. The walk is idempotent end to
//! end, so a crash mid-walk just means the next run re-covers ground
//! the coordinator will dedup.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use feed_core::{IngestOrigin, Result, StreamKind};
use storage::KillmailRepository;
use telemetry::metrics;
use upstream::{HistorySource, RecordFetcher};

use crate::coordinator::IngestionCoordinator;

/// Backfill tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Events older than this are left to rest.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Characters walked concurrently.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_max_age_days() -> i64 {
    30
}

fn default_worker_count() -> usize {
    5
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            worker_count: default_worker_count(),
        }
    }
}

/// Accounting for one character's walk.
#[derive(Debug, Clone)]
pub struct CharacterBackfill {
    pub character_id: u64,
    pub processed: u64,
    pub failed: u64,
    pub error: Option<String>,
}

/// Accounting for one whole run.
#[derive(Debug, Default, Clone)]
pub struct BackfillRunSummary {
    pub characters: usize,
    pub processed: u64,
    pub failed: u64,
    /// Characters whose walk aborted on a hard upstream error.
    pub aborted: usize,
}

pub struct BackfillOrchestrator {
    history: Arc<dyn HistorySource>,
    fetcher: Arc<dyn RecordFetcher>,
    coordinator: Arc<IngestionCoordinator>,
    repository: Arc<dyn KillmailRepository>,
    config: BackfillConfig,
}

impl BackfillOrchestrator {
    pub fn new(
        history: Arc<dyn HistorySource>,
        fetcher: Arc<dyn RecordFetcher>,
        coordinator: Arc<IngestionCoordinator>,
        repository: Arc<dyn KillmailRepository>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            history,
            fetcher,
            coordinator,
            repository,
            config,
        }
    }

    /// Walks every given character, a bounded number at a time.
    pub async fn run(self: &Arc<Self>, characters: &[u64]) -> BackfillRunSummary {
        let mut summary = BackfillRunSummary {
            characters: characters.len(),
            ..Default::default()
        };
        let mut pending = characters.iter().copied();
        let mut tasks: JoinSet<CharacterBackfill> = JoinSet::new();

        loop {
            while tasks.len() < self.config.worker_count.max(1) {
                match pending.next() {
                    Some(character_id) => {
                        let this = Arc::clone(self);
                        tasks.spawn(async move { this.run_character(character_id).await });
                    }
                    None => break,
                }
            }
            match tasks.join_next().await {
                Some(Ok(character)) => {
                    summary.processed += character.processed;
                    summary.failed += character.failed;
                    if character.error.is_some() {
                        summary.aborted += 1;
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "backfill task panicked");
                    summary.aborted += 1;
                }
                None => break,
            }
        }

        info!(
            characters = summary.characters,
            processed = summary.processed,
            failed = summary.failed,
            aborted = summary.aborted,
            "backfill run complete"
        );
        summary
    }

    /// Walks both history streams for one character.
    pub async fn run_character(&self, character_id: u64) -> CharacterBackfill {
        let mut result = CharacterBackfill {
            character_id,
            processed: 0,
            failed: 0,
            error: None,
        };

        for kind in [StreamKind::Kills, StreamKind::Losses] {
            match self.run_stream(character_id, kind).await {
                Ok((processed, failed)) => {
                    result.processed += processed;
                    result.failed += failed;
                }
                Err(err) => {
                    // Hard upstream error after retries: leave the
                    // checkpoint where it is and try again next run.
                    warn!(
                        character_id,
                        stream = kind.as_str(),
                        error = %err,
                        "backfill walk aborted"
                    );
                    result.error = Some(err.to_string());
                    break;
                }
            }
        }
        result
    }

    async fn run_stream(&self, character_id: u64, kind: StreamKind) -> Result<(u64, u64)> {
        let stream = kind.stream_name(character_id);
        let resume_from = self
            .repository
            .checkpoint(&stream)
            .await?
            .map(|c| c.last_seen_id)
            .unwrap_or(0);
        let cutoff = Utc::now() - Duration::days(self.config.max_age_days);

        let mut processed = 0u64;
        let mut failed = 0u64;
        let mut newest: Option<(u64, DateTime<Utc>)> = None;
        // Oldest id that failed and left nothing behind in storage.
        let mut holdback: Option<u64> = None;
        let mut page = 1u32;

        'walk: loop {
            let entries = match self.history.character_history(character_id, kind, page).await {
                Ok(entries) => entries,
                Err(err) if err.is_client_rejection() => {
                    debug!(%stream, page, "history exhausted upstream");
                    break;
                }
                Err(err) => return Err(err),
            };
            if entries.is_empty() {
                break;
            }
            metrics().backfill_pages.inc();

            for entry in &entries {
                // Pages are newest-first, so the first already-seen or
                // too-old entry ends the whole walk.
                if entry.killmail_id <= resume_from {
                    break 'walk;
                }
                if entry.kill_time.is_some_and(|t| t < cutoff) {
                    break 'walk;
                }

                let draft = match self.fetcher.fetch(entry.killmail_id, None).await {
                    Ok(draft) => draft,
                    Err(err) => {
                        warn!(
                            %stream,
                            killmail_id = entry.killmail_id,
                            error = %err,
                            "backfill fetch failed"
                        );
                        metrics().backfill_failures.inc();
                        failed += 1;
                        // The item must stay reachable: park a partial
                        // row for enrichment, or hold the checkpoint
                        // below it so the next run walks back to it.
                        let parked = self
                            .coordinator
                            .ingest_reference(
                                entry.killmail_id,
                                None,
                                IngestOrigin::Backfill { character_id },
                            )
                            .await;
                        if parked.is_err() {
                            holdback = Some(
                                holdback.map_or(entry.killmail_id, |h| h.min(entry.killmail_id)),
                            );
                        }
                        continue;
                    }
                };
                if draft.kill_time < cutoff {
                    break 'walk;
                }

                let kill_time = draft.kill_time;
                match self
                    .coordinator
                    .ingest(draft, IngestOrigin::Backfill { character_id })
                    .await
                {
                    Ok(_) => {
                        processed += 1;
                        metrics().backfill_events.inc();
                        if newest.map_or(true, |(id, _)| entry.killmail_id > id) {
                            newest = Some((entry.killmail_id, kill_time));
                        }
                    }
                    Err(err) => {
                        // Nothing was written for this id; see the
                        // holdback rule above.
                        warn!(
                            %stream,
                            killmail_id = entry.killmail_id,
                            error = %err,
                            "backfill ingest failed, skipping item"
                        );
                        metrics().backfill_failures.inc();
                        failed += 1;
                        holdback = Some(
                            holdback.map_or(entry.killmail_id, |h| h.min(entry.killmail_id)),
                        );
                    }
                }
            }
            page += 1;
        }

        // The checkpoint only moves once the walk has covered the
        // whole gap down to the old cursor (or the cutoff), and never
        // past an item that left nothing behind in storage.
        if let Some((newest_id, last_seen_time)) = newest {
            let last_seen_id = match holdback {
                Some(blocked) => newest_id.min(blocked.saturating_sub(1)),
                None => newest_id,
            };
            if last_seen_id > resume_from {
                self.repository
                    .advance_checkpoint(&stream, last_seen_id, last_seen_time)
                    .await?;
            }
        }

        debug!(%stream, processed, failed, "stream walk complete");
        Ok((processed, failed))
    }
}
