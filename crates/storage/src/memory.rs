//! In-memory repository for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use feed_core::{Checkpoint, Completeness, Error, Killmail, Loss, Result};

use crate::repository::{KillmailRepository, StoredKillmail};

#[derive(Default)]
struct Inner {
    records: HashMap<u64, StoredKillmail>,
    losses: HashMap<(u64, u64), Loss>,
    checkpoints: HashMap<String, Checkpoint>,
}

/// Mutex-guarded maps; the lock scope is the atomic write unit.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
    fail_writes: Mutex<bool>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate persistence failures for error-path tests.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn loss_count(&self) -> usize {
        self.inner.lock().losses.len()
    }

    fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(Error::persistence("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl KillmailRepository for MemoryRepository {
    async fn find_by_event_id(&self, killmail_id: u64) -> Result<Option<StoredKillmail>> {
        Ok(self.inner.lock().records.get(&killmail_id).cloned())
    }

    async fn upsert_full(&self, killmail: &Killmail, losses: &[Loss]) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        inner.records.insert(
            killmail.killmail_id,
            StoredKillmail {
                killmail: killmail.clone(),
                completeness: Completeness::Full,
            },
        );
        for loss in losses {
            inner
                .losses
                .insert((loss.character_id, loss.killmail_id), loss.clone());
        }
        debug!(
            killmail_id = killmail.killmail_id,
            losses = losses.len(),
            "stored full record"
        );
        Ok(())
    }

    async fn upsert_partial(&self, killmail: &Killmail) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.records.get(&killmail.killmail_id) {
            if existing.completeness == Completeness::Full {
                return Ok(());
            }
        }
        inner.records.insert(
            killmail.killmail_id,
            StoredKillmail {
                killmail: killmail.clone(),
                completeness: Completeness::Partial,
            },
        );
        Ok(())
    }

    async fn find_partial(&self, limit: usize) -> Result<Vec<Killmail>> {
        let inner = self.inner.lock();
        let mut partials: Vec<&StoredKillmail> = inner
            .records
            .values()
            .filter(|r| r.completeness == Completeness::Partial)
            .collect();
        partials.sort_by_key(|r| r.killmail.kill_time);
        Ok(partials
            .into_iter()
            .take(limit)
            .map(|r| r.killmail.clone())
            .collect())
    }

    async fn find_losses(&self, character_id: u64) -> Result<Vec<Loss>> {
        let inner = self.inner.lock();
        let mut losses: Vec<Loss> = inner
            .losses
            .values()
            .filter(|l| l.character_id == character_id)
            .cloned()
            .collect();
        losses.sort_by(|a, b| b.kill_time.cmp(&a.kill_time));
        Ok(losses)
    }

    async fn checkpoint(&self, stream: &str) -> Result<Option<Checkpoint>> {
        Ok(self.inner.lock().checkpoints.get(stream).cloned())
    }

    async fn advance_checkpoint(
        &self,
        stream: &str,
        last_seen_id: u64,
        last_seen_time: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        match inner.checkpoints.get_mut(stream) {
            Some(existing) => {
                if last_seen_id > existing.last_seen_id {
                    existing.last_seen_id = last_seen_id;
                    existing.last_seen_time = last_seen_time;
                }
                // Lower or equal ids are duplicate/racing advances; no-op.
            }
            None => {
                inner.checkpoints.insert(
                    stream.to_string(),
                    Checkpoint {
                        stream: stream.to_string(),
                        last_seen_id,
                        last_seen_time,
                    },
                );
            }
        }
        Ok(())
    }
}
