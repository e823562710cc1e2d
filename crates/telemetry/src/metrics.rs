//! Internal metrics collection.
//!
//! Collects ingestion counters in-memory; the admin API serves a
//! snapshot and the scheduler logs one periodically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the ingestion pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Coordinator outcomes
    pub events_seen: Counter,
    pub ingested_full: Counter,
    pub ingested_partial: Counter,
    pub skipped_duplicate: Counter,
    pub skipped_irrelevant: Counter,
    pub ingest_failures: Counter,

    // Enrichment
    pub enriched: Counter,
    pub enrichment_failures: Counter,
    pub enrichment_skipped: Counter,

    // Backfill
    pub backfill_pages: Counter,
    pub backfill_events: Counter,
    pub backfill_failures: Counter,

    // Realtime feeds
    pub push_batches: Counter,
    pub push_events: Counter,
    pub push_reconnects: Counter,
    pub queue_polls: Counter,
    pub queue_items: Counter,
    pub queue_errors: Counter,

    // Upstream resilience
    pub upstream_retries: Counter,
    pub breaker_rejections: Counter,
    pub persistence_failures: Counter,

    // Latency histograms
    pub fetch_latency_ms: Histogram,
    pub write_latency_ms: Histogram,

    // Gauges
    pub tracked_characters: Gauge,
    pub partial_backlog: Gauge,
    pub index_breaker_open: Gauge,
    pub detail_breaker_open: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open flag for the named upstream breaker, 1 while open.
    pub fn breaker_open(&self, service: &str) -> Option<&Gauge> {
        match service {
            "index" => Some(&self.index_breaker_open),
            "detail" => Some(&self.detail_breaker_open),
            _ => None,
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_seen: u64,
    pub ingested_full: u64,
    pub ingested_partial: u64,
    pub skipped_duplicate: u64,
    pub skipped_irrelevant: u64,
    pub ingest_failures: u64,
    pub enriched: u64,
    pub enrichment_failures: u64,
    pub enrichment_skipped: u64,
    pub backfill_pages: u64,
    pub backfill_events: u64,
    pub backfill_failures: u64,
    pub push_batches: u64,
    pub push_events: u64,
    pub push_reconnects: u64,
    pub queue_polls: u64,
    pub queue_items: u64,
    pub queue_errors: u64,
    pub upstream_retries: u64,
    pub breaker_rejections: u64,
    pub persistence_failures: u64,
    pub fetch_latency_mean_ms: f64,
    pub write_latency_mean_ms: f64,
    pub tracked_characters: u64,
    pub partial_backlog: u64,
    pub index_breaker_open: u64,
    pub detail_breaker_open: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_seen: self.events_seen.get(),
            ingested_full: self.ingested_full.get(),
            ingested_partial: self.ingested_partial.get(),
            skipped_duplicate: self.skipped_duplicate.get(),
            skipped_irrelevant: self.skipped_irrelevant.get(),
            ingest_failures: self.ingest_failures.get(),
            enriched: self.enriched.get(),
            enrichment_failures: self.enrichment_failures.get(),
            enrichment_skipped: self.enrichment_skipped.get(),
            backfill_pages: self.backfill_pages.get(),
            backfill_events: self.backfill_events.get(),
            backfill_failures: self.backfill_failures.get(),
            push_batches: self.push_batches.get(),
            push_events: self.push_events.get(),
            push_reconnects: self.push_reconnects.get(),
            queue_polls: self.queue_polls.get(),
            queue_items: self.queue_items.get(),
            queue_errors: self.queue_errors.get(),
            upstream_retries: self.upstream_retries.get(),
            breaker_rejections: self.breaker_rejections.get(),
            persistence_failures: self.persistence_failures.get(),
            fetch_latency_mean_ms: self.fetch_latency_ms.mean(),
            write_latency_mean_ms: self.write_latency_ms.mean(),
            tracked_characters: self.tracked_characters.get(),
            partial_backlog: self.partial_backlog.get(),
            index_breaker_open: self.index_breaker_open.get(),
            detail_breaker_open: self.detail_breaker_open.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
