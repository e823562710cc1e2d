//! Killfeed ingestion pipeline
//!
//! Ingests killmail events for a tracked character roster from three
//! independent upstream feeds:
//! - websocket push subscriptions (realtime)
//! - a long-poll broadcast queue (realtime)
//! - paginated per-character history (checkpointed backfill)
//!
//! Every feed converges on one ingestion coordinator so each event is
//! persisted exactly once, with per-character Loss views derived
//! atomically alongside the record.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{router, AppState};
use feed_core::{StaticRosterSource, TrackedRoster};
use storage::{KillmailRepository, MemoryRepository};
use telemetry::{health, init_tracing_from_env};
use upstream::{
    DetailClient, HttpQueueClient, HttpRecordFetcher, IndexClient, SubscriptionSet, UpstreamConfig,
    WsConnector,
};
use worker::{
    BackfillConfig, BackfillOrchestrator, EnrichmentJob, IngestionCoordinator, PushFeedWorker,
    QueueWorker, RosterRefreshWorker, WorkerConfig, WorkerScheduler,
};

const ENRICHMENT_BATCH_LIMIT: usize = 50;
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const PUSH_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Tracked character ids, until an external roster service exists
    #[serde(default)]
    tracked_characters: Vec<u64>,

    #[serde(default)]
    upstream: UpstreamConfig,

    #[serde(default)]
    backfill: BackfillConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tracked_characters: Vec::new(),
            upstream: UpstreamConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection, and
    // both reqwest and tungstenite sit on the same provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("Starting killfeed v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        index_url = %config.upstream.index_url,
        detail_url = %config.upstream.detail_url,
        tracked = config.tracked_characters.len(),
        "Loaded configuration"
    );
    if config.tracked_characters.is_empty() {
        warn!("tracked roster is empty; every event will be skipped as irrelevant");
    }

    // Storage. The in-memory repository backs local runs; a durable
    // engine plugs in behind the same trait.
    let repository: Arc<dyn KillmailRepository> = Arc::new(MemoryRepository::new());
    health().storage.set_healthy();

    // Upstream clients.
    let index = Arc::new(IndexClient::new(&config.upstream).context("Failed to build index client")?);
    let detail =
        Arc::new(DetailClient::new(&config.upstream).context("Failed to build detail client")?);
    let fetcher = Arc::new(HttpRecordFetcher::new(index.clone(), detail.clone()));
    let breakers = vec![index.breaker(), detail.breaker()];

    // Roster.
    let roster = Arc::new(TrackedRoster::with_characters(
        config.tracked_characters.iter().copied(),
    ));
    let roster_source = Arc::new(StaticRosterSource::new(
        config.tracked_characters.iter().copied(),
    ));

    // Pipeline.
    let coordinator = Arc::new(IngestionCoordinator::new(
        repository.clone(),
        fetcher.clone(),
        roster.clone(),
    ));
    let enrichment = Arc::new(EnrichmentJob::new(
        repository.clone(),
        coordinator.clone(),
        ENRICHMENT_BATCH_LIMIT,
    ));
    let backfill = Arc::new(BackfillOrchestrator::new(
        index.clone(),
        fetcher.clone(),
        coordinator.clone(),
        repository.clone(),
        config.backfill.clone(),
    ));
    let roster_refresh = Arc::new(RosterRefreshWorker::new(roster_source, roster.clone()));

    // Realtime consumers.
    let mut subscriptions = SubscriptionSet::new(
        config.upstream.max_subscribed_characters,
        config.upstream.max_subscribed_systems,
    );
    subscriptions.add_characters(config.tracked_characters.iter().copied());
    let push_worker = Arc::new(PushFeedWorker::new(
        Arc::new(WsConnector::new(config.upstream.push_url.clone())),
        coordinator.clone(),
        config.upstream.push_topic.clone(),
        subscriptions,
        PUSH_RECONNECT_DELAY,
    ));
    let queue_worker = Arc::new(QueueWorker::new(
        Arc::new(HttpQueueClient::new(&config.upstream).context("Failed to build queue client")?),
        coordinator.clone(),
        QUEUE_ERROR_BACKOFF,
    ));

    // Background loops, all draining on the same shutdown signal.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::new(
        WorkerScheduler::new(
            WorkerConfig::default(),
            enrichment.clone(),
            backfill,
            roster_refresh,
            roster.clone(),
        )
        .with_push_worker(push_worker)
        .with_queue_worker(queue_worker),
    );
    let worker_handles = scheduler.start(shutdown_rx);

    // Admin surface.
    let state = AppState::new(repository, roster, enrichment, breakers);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    shutdown_tx.send(true).ok();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Worker task failed during shutdown: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("KILLFEED")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for fields the config crate's nested/env
    // parsing does not handle reliably.
    if let Ok(tracked) = std::env::var("KILLFEED_TRACKED_CHARACTERS") {
        config.tracked_characters = tracked
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
    }
    if let Ok(url) = std::env::var("KILLFEED_UPSTREAM_INDEX_URL") {
        config.upstream.index_url = url;
    }
    if let Ok(url) = std::env::var("KILLFEED_UPSTREAM_DETAIL_URL") {
        config.upstream.detail_url = url;
    }
    if let Ok(url) = std::env::var("KILLFEED_UPSTREAM_QUEUE_URL") {
        config.upstream.queue_url = url;
    }
    if let Ok(url) = std::env::var("KILLFEED_UPSTREAM_PUSH_URL") {
        config.upstream.push_url = url;
    }
    if let Ok(topic) = std::env::var("KILLFEED_UPSTREAM_PUSH_TOPIC") {
        config.upstream.push_topic = topic;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
