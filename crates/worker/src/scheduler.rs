//! Drives the periodic workers and owns their lifecycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use feed_core::TrackedRoster;
use telemetry::metrics;

use crate::backfill::BackfillOrchestrator;
use crate::enrichment::EnrichmentJob;
use crate::realtime::{PushFeedWorker, QueueWorker};
use crate::roster_refresh::RosterRefreshWorker;

/// Worker cadence tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enrichment_interval: Duration,
    pub roster_refresh_interval: Duration,
    pub backfill_interval: Duration,
    pub metrics_log_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enrichment_interval: Duration::from_secs(900),
            roster_refresh_interval: Duration::from_secs(300),
            backfill_interval: Duration::from_secs(3600),
            metrics_log_interval: Duration::from_secs(60),
        }
    }
}

/// Spawns and supervises all background loops. Every loop watches the
/// same shutdown channel and drains promptly when it flips.
pub struct WorkerScheduler {
    config: WorkerConfig,
    enrichment: Arc<EnrichmentJob>,
    backfill: Arc<BackfillOrchestrator>,
    roster_refresh: Arc<RosterRefreshWorker>,
    roster: Arc<TrackedRoster>,
    push_worker: Option<Arc<PushFeedWorker>>,
    queue_worker: Option<Arc<QueueWorker>>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        enrichment: Arc<EnrichmentJob>,
        backfill: Arc<BackfillOrchestrator>,
        roster_refresh: Arc<RosterRefreshWorker>,
        roster: Arc<TrackedRoster>,
    ) -> Self {
        Self {
            config,
            enrichment,
            backfill,
            roster_refresh,
            roster,
            push_worker: None,
            queue_worker: None,
        }
    }

    pub fn with_push_worker(mut self, worker: Arc<PushFeedWorker>) -> Self {
        self.push_worker = Some(worker);
        self
    }

    pub fn with_queue_worker(mut self, worker: Arc<QueueWorker>) -> Self {
        self.queue_worker = Some(worker);
        self
    }

    /// Spawns every loop; the returned handles complete once shutdown
    /// is signalled.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let this = Arc::clone(self);
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { this.roster_loop(rx).await }));

        let this = Arc::clone(self);
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { this.backfill_loop(rx).await }));

        let this = Arc::clone(self);
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { this.enrichment_loop(rx).await }));

        let this = Arc::clone(self);
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { this.metrics_loop(rx).await }));

        if let Some(worker) = &self.push_worker {
            let worker = Arc::clone(worker);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { worker.run(rx).await }));
        }

        if let Some(worker) = &self.queue_worker {
            let worker = Arc::clone(worker);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { worker.run(rx).await }));
        }

        info!(loops = handles.len(), "worker scheduler started");
        handles
    }

    async fn roster_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.roster_refresh_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    // Errors keep the previous snapshot; nothing to do
                    // here beyond what refresh() already logged.
                    if self.roster_refresh.refresh().await.is_ok() {
                        if let Some(push) = &self.push_worker {
                            // Newly tracked characters get push coverage
                            // on the next (re)connect.
                            push.subscribe_characters(self.roster.snapshot().iter().copied());
                        }
                    }
                }
            }
        }
        debug!("roster loop stopped");
    }

    async fn backfill_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.backfill_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let characters: Vec<u64> = self.roster.snapshot().iter().copied().collect();
                    if characters.is_empty() {
                        debug!("roster empty, skipping backfill run");
                        continue;
                    }
                    self.backfill.run(&characters).await;
                }
            }
        }
        debug!("backfill loop stopped");
    }

    async fn enrichment_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.enrichment_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.enrichment.run().await {
                        warn!(error = %err, "enrichment run failed");
                    }
                }
            }
        }
        debug!("enrichment loop stopped");
    }

    async fn metrics_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.metrics_log_interval);
        // Skip the immediate first tick; an all-zero line is noise.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let snap = metrics().snapshot();
                    info!(
                        events_seen = snap.events_seen,
                        ingested_full = snap.ingested_full,
                        ingested_partial = snap.ingested_partial,
                        skipped_duplicate = snap.skipped_duplicate,
                        skipped_irrelevant = snap.skipped_irrelevant,
                        ingest_failures = snap.ingest_failures,
                        partial_backlog = snap.partial_backlog,
                        breaker_rejections = snap.breaker_rejections,
                        "ingestion metrics"
                    );
                }
            }
        }
        debug!("metrics loop stopped");
    }
}
