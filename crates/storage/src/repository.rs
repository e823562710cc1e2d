//! The narrow repository contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use feed_core::{Checkpoint, Completeness, Killmail, Loss, Result};

/// A persisted killmail with its completeness flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKillmail {
    pub killmail: Killmail,
    pub completeness: Completeness,
}

/// Durable storage, atomic at single-event granularity.
///
/// `upsert_full` writes the record, its attacker/victim sub-rows, and
/// the derived loss views as one unit: downstream aggregate queries
/// assume a record and its loss views are never observed in a
/// partially-written state. The event id is the only key; writes for
/// the same id are idempotent, which is what makes concurrent
/// delivery from two feeds safe without a distributed lock.
#[async_trait]
pub trait KillmailRepository: Send + Sync {
    async fn find_by_event_id(&self, killmail_id: u64) -> Result<Option<StoredKillmail>>;

    /// Atomically upserts a full record plus its loss views. Upgrades
    /// an existing partial record in place; the id never changes.
    async fn upsert_full(&self, killmail: &Killmail, losses: &[Loss]) -> Result<()>;

    /// Upserts a partial record. Never downgrades an existing full
    /// record.
    async fn upsert_partial(&self, killmail: &Killmail) -> Result<()>;

    /// Up to `limit` partial records, oldest first, for enrichment.
    async fn find_partial(&self, limit: usize) -> Result<Vec<Killmail>>;

    /// Loss views for one tracked character, newest first.
    async fn find_losses(&self, character_id: u64) -> Result<Vec<Loss>>;

    async fn checkpoint(&self, stream: &str) -> Result<Option<Checkpoint>>;

    /// Advances a stream cursor. Must be monotonic: an advance whose
    /// `last_seen_id` is not greater than the stored value is a
    /// no-op, making concurrent or duplicate advances idempotent.
    async fn advance_checkpoint(
        &self,
        stream: &str,
        last_seen_id: u64,
        last_seen_time: DateTime<Utc>,
    ) -> Result<()>;
}
