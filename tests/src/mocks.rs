//! Mock upstream services.
//!
//! Each mock implements the same trait as its production counterpart,
//! so the pipeline under test runs every production code path except
//! the network transport itself.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use feed_core::{Error, Killmail, KillmailSummary, Result, StreamKind};
use upstream::{
    HistoryEntry, HistorySource, InboundMessage, OutboundMessage, PushConnector, PushSession,
    QueueSource, RecordFetcher,
};

/// Fetcher over in-memory summary/detail tables, with outage toggles.
#[derive(Default)]
pub struct MockRecordFetcher {
    drafts: Mutex<HashMap<u64, Killmail>>,
    summaries: Mutex<HashMap<u64, KillmailSummary>>,
    index_down: AtomicBool,
    detail_down: AtomicBool,
    pub fetch_calls: AtomicU32,
}

impl MockRecordFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a killmail with both the index and detail side.
    pub fn add(&self, killmail: Killmail) {
        self.summaries.lock().insert(
            killmail.killmail_id,
            crate::fixtures::summary_of(&killmail),
        );
        self.drafts.lock().insert(killmail.killmail_id, killmail);
    }

    pub fn set_index_down(&self, down: bool) {
        self.index_down.store(down, Ordering::SeqCst);
    }

    pub fn set_detail_down(&self, down: bool) {
        self.detail_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordFetcher for MockRecordFetcher {
    async fn fetch(&self, killmail_id: u64, _known: Option<&KillmailSummary>) -> Result<Killmail> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.index_down.load(Ordering::SeqCst) {
            return Err(Error::IndexUnavailable("mock index outage".into()));
        }
        if self.detail_down.load(Ordering::SeqCst) {
            return Err(Error::DetailUnavailable("mock detail outage".into()));
        }
        self.drafts
            .lock()
            .get(&killmail_id)
            .cloned()
            .ok_or_else(|| Error::DetailUnavailable("unknown killmail".into()))
    }

    async fn summary(&self, killmail_id: u64) -> Result<KillmailSummary> {
        if self.index_down.load(Ordering::SeqCst) {
            return Err(Error::IndexUnavailable("mock index outage".into()));
        }
        self.summaries
            .lock()
            .get(&killmail_id)
            .cloned()
            .ok_or_else(|| Error::IndexUnavailable("unknown killmail".into()))
    }
}

/// History pages keyed by (character, stream), newest-first.
#[derive(Default)]
pub struct MockHistorySource {
    pages: Mutex<HashMap<(u64, &'static str), Vec<Vec<HistoryEntry>>>>,
}

impl MockHistorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, character_id: u64, kind: StreamKind, entries: Vec<HistoryEntry>) {
        self.pages
            .lock()
            .entry((character_id, kind.as_str()))
            .or_default()
            .push(entries);
    }
}

#[async_trait]
impl HistorySource for MockHistorySource {
    async fn character_history(
        &self,
        character_id: u64,
        kind: StreamKind,
        page: u32,
    ) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .pages
            .lock()
            .get(&(character_id, kind.as_str()))
            .and_then(|pages| pages.get(page as usize - 1))
            .cloned()
            .unwrap_or_default())
    }
}

/// Scripted long-poll queue; blocks forever once the script runs out.
pub struct MockQueueSource {
    items: Mutex<VecDeque<Result<Option<Killmail>>>>,
}

impl MockQueueSource {
    pub fn new(items: Vec<Result<Option<Killmail>>>) -> Self {
        Self {
            items: Mutex::new(items.into()),
        }
    }
}

#[async_trait]
impl QueueSource for MockQueueSource {
    async fn poll(&self) -> Result<Option<Killmail>> {
        // The guard must drop before the pending await or the future
        // loses Send.
        let next = self.items.lock().pop_front();
        match next {
            Some(item) => item,
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// What the push worker did, in order, across all sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Sent(OutboundMessage),
    Delivered(u64),
}

/// Scripted push feed. Each connect consumes one frame script; when
/// the scripts run out, connects block until shutdown.
pub struct MockPushConnector {
    log: Arc<Mutex<Vec<PushEvent>>>,
    scripts: Mutex<VecDeque<Vec<Result<InboundMessage>>>>,
    pub connects: AtomicU32,
}

impl MockPushConnector {
    pub fn new(scripts: Vec<Vec<Result<InboundMessage>>>) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            scripts: Mutex::new(scripts.into()),
            connects: AtomicU32::new(0),
        }
    }

    /// Everything sent and delivered, in order.
    pub fn log(&self) -> Vec<PushEvent> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl PushConnector for MockPushConnector {
    async fn connect(&self) -> Result<Box<dyn PushSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().pop_front();
        match script {
            Some(frames) => Ok(Box::new(MockPushSession {
                log: self.log.clone(),
                frames: frames.into(),
            })),
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

struct MockPushSession {
    log: Arc<Mutex<Vec<PushEvent>>>,
    frames: VecDeque<Result<InboundMessage>>,
}

#[async_trait]
impl PushSession for MockPushSession {
    async fn send(&mut self, msg: &OutboundMessage) -> Result<()> {
        self.log.lock().push(PushEvent::Sent(msg.clone()));
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<InboundMessage>> {
        let frame = self.frames.pop_front()?;
        if let Ok(InboundMessage::BatchUpdate { killmails }) = &frame {
            let mut log = self.log.lock();
            for km in killmails {
                log.push(PushEvent::Delivered(km.killmail_id));
            }
        }
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The workers run these mocks on spawned tasks, so their futures
    // have to be Send even on the blocks-forever path.
    #[tokio::test]
    async fn mock_futures_move_across_tasks() {
        let queue = Arc::new(MockQueueSource::new(vec![Ok(None)]));
        let polled = tokio::spawn(async move { queue.poll().await })
            .await
            .unwrap();
        assert!(matches!(polled, Ok(None)));

        let connector = Arc::new(MockPushConnector::new(vec![vec![]]));
        let session = tokio::spawn(async move { connector.connect().await })
            .await
            .unwrap();
        assert!(session.is_ok());
    }
}
