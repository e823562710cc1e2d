//! Realtime consumers: the push-subscription feed and the long-poll
//! queue.
//!
//! Both hand every event to the coordinator and keep running through
//! item failures. The push worker owns the reconnect loop; on every
//! fresh session it must replay the full interest set before handling
//! inbound traffic, otherwise the feed forgets who we care about.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use feed_core::{Error, IngestOrigin, Killmail, Result};
use telemetry::{health, metrics};
use upstream::{
    InboundMessage, OutboundMessage, PushConnector, PushSession, QueueSource, SubscriptionSet,
};

use crate::coordinator::IngestionCoordinator;

/// Batches can re-deliver around reconnects; this window absorbs the
/// repeats without a storage round-trip per event.
const SEEN_CACHE_CAPACITY: u64 = 50_000;
const SEEN_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Consumes the websocket push feed.
pub struct PushFeedWorker {
    connector: Arc<dyn PushConnector>,
    coordinator: Arc<IngestionCoordinator>,
    topic: String,
    subscriptions: Mutex<SubscriptionSet>,
    seen: moka::future::Cache<u64, ()>,
    reconnect_delay: Duration,
}

impl PushFeedWorker {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        coordinator: Arc<IngestionCoordinator>,
        topic: impl Into<String>,
        subscriptions: SubscriptionSet,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            coordinator,
            topic: topic.into(),
            subscriptions: Mutex::new(subscriptions),
            seen: moka::future::Cache::builder()
                .max_capacity(SEEN_CACHE_CAPACITY)
                .time_to_live(SEEN_CACHE_TTL)
                .build(),
            reconnect_delay,
        }
    }

    /// Extends the character interest set; takes effect on the next
    /// (re)connect.
    pub fn subscribe_characters(&self, ids: impl IntoIterator<Item = u64>) -> usize {
        self.subscriptions.lock().add_characters(ids)
    }

    /// Connect-consume-reconnect until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, "push feed worker starting");
        loop {
            let mut session = tokio::select! {
                _ = shutdown.changed() => break,
                connected = self.connector.connect() => match connected {
                    Ok(session) => session,
                    Err(err) => {
                        warn!(error = %err, "push feed connect failed");
                        health().push_feed.set_unhealthy(err.to_string());
                        if !self.pause(&mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                },
            };
            metrics().push_reconnects.inc();

            if let Err(err) = self.establish(session.as_mut()).await {
                warn!(error = %err, "push feed subscription replay failed");
                health().push_feed.set_unhealthy(err.to_string());
                if !self.pause(&mut shutdown).await {
                    break;
                }
                continue;
            }
            health().push_feed.set_healthy();

            let disconnected = self.consume(session.as_mut(), &mut shutdown).await;
            if !disconnected {
                // Shutdown requested.
                break;
            }
            health().push_feed.set_unhealthy("disconnected");
            if !self.pause(&mut shutdown).await {
                break;
            }
        }
        info!("push feed worker stopped");
    }

    /// Joins the topic and replays every current subscription. Nothing
    /// inbound is handled until this completes.
    async fn establish(&self, session: &mut dyn PushSession) -> Result<()> {
        session
            .send(&OutboundMessage::Join {
                topic: self.topic.clone(),
            })
            .await?;

        let replay = self.subscriptions.lock().replay_messages();
        let message_count = replay.len();
        for message in replay {
            session.send(&message).await?;
        }
        debug!(messages = message_count, "push feed subscriptions replayed");
        Ok(())
    }

    /// Returns true on disconnect, false on shutdown.
    async fn consume(
        &self,
        session: &mut dyn PushSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            let message = tokio::select! {
                _ = shutdown.changed() => return false,
                message = session.next() => message,
            };
            match message {
                Some(Ok(InboundMessage::BatchUpdate { killmails })) => {
                    self.handle_batch(killmails).await;
                }
                Some(Ok(InboundMessage::CountUpdate { count })) => {
                    debug!(count, "push feed count update");
                }
                Some(Ok(InboundMessage::Unknown)) => {}
                Some(Err(Error::InvalidPayload(reason))) => {
                    // One undecodable frame is not a broken socket.
                    warn!(%reason, "dropping undecodable push message");
                }
                Some(Err(err)) => {
                    warn!(error = %err, "push feed read failed");
                    return true;
                }
                None => {
                    warn!("push feed closed by upstream");
                    return true;
                }
            }
        }
    }

    async fn handle_batch(&self, killmails: Vec<Killmail>) {
        metrics().push_batches.inc();
        for killmail in killmails {
            metrics().push_events.inc();
            let killmail_id = killmail.killmail_id;
            if self.seen.contains_key(&killmail_id) {
                metrics().skipped_duplicate.inc();
                continue;
            }
            // One bad item never takes down the batch.
            match self
                .coordinator
                .ingest(killmail, IngestOrigin::Realtime)
                .await
            {
                Ok(outcome) => {
                    debug!(killmail_id, outcome = outcome.as_str(), "push event handled");
                    self.seen.insert(killmail_id, ()).await;
                }
                Err(err) => {
                    warn!(killmail_id, error = %err, "push event ingest failed");
                }
            }
        }
    }

    /// Backs off before a reconnect attempt; false means shutdown.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = shutdown.changed() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }
}

/// Consumes the long-poll queue.
///
/// The queue is a shared broadcast with no per-client cursor; items
/// missed while down are recovered by backfill, so errors here only
/// back off and retry.
pub struct QueueWorker {
    source: Arc<dyn QueueSource>,
    coordinator: Arc<IngestionCoordinator>,
    error_backoff: Duration,
}

impl QueueWorker {
    pub fn new(
        source: Arc<dyn QueueSource>,
        coordinator: Arc<IngestionCoordinator>,
        error_backoff: Duration,
    ) -> Self {
        Self {
            source,
            coordinator,
            error_backoff,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("queue worker starting");
        loop {
            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                polled = self.source.poll() => polled,
            };
            metrics().queue_polls.inc();

            match polled {
                Ok(Some(killmail)) => {
                    metrics().queue_items.inc();
                    health().queue_feed.set_healthy();
                    let killmail_id = killmail.killmail_id;
                    if let Err(err) = self
                        .coordinator
                        .ingest(killmail, IngestOrigin::Realtime)
                        .await
                    {
                        warn!(killmail_id, error = %err, "queue item ingest failed");
                    }
                }
                Ok(None) => {
                    // Server-side wait elapsed empty; poll again.
                    health().queue_feed.set_healthy();
                }
                Err(err) => {
                    metrics().queue_errors.inc();
                    health().queue_feed.set_unhealthy(err.to_string());
                    warn!(error = %err, "queue poll failed");
                    let keep_going = tokio::select! {
                        _ = shutdown.changed() => false,
                        _ = tokio::time::sleep(self.error_backoff) => true,
                    };
                    if !keep_going {
                        break;
                    }
                }
            }
        }
        info!("queue worker stopped");
    }
}
