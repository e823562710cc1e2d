//! Tracked-character roster snapshot.
//!
//! The hot path answers "is this character ours" without a storage
//! round-trip. Refresh replaces the whole snapshot atomically so
//! concurrent readers never observe a half-updated set.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::Result;

/// Source of truth for the tracked roster, polled on a timer.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn tracked_characters(&self) -> Result<HashSet<u64>>;
}

/// A fixed roster, e.g. from configuration.
pub struct StaticRosterSource {
    characters: HashSet<u64>,
}

impl StaticRosterSource {
    pub fn new(characters: impl IntoIterator<Item = u64>) -> Self {
        Self {
            characters: characters.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RosterSource for StaticRosterSource {
    async fn tracked_characters(&self) -> Result<HashSet<u64>> {
        Ok(self.characters.clone())
    }
}

/// Shared, periodically refreshed membership set. Read-only from the
/// ingestion hot path.
#[derive(Debug, Default)]
pub struct TrackedRoster {
    inner: RwLock<Arc<HashSet<u64>>>,
}

impl TrackedRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = u64>) -> Self {
        let roster = Self::new();
        roster.replace(characters.into_iter().collect());
        roster
    }

    pub fn contains(&self, character_id: u64) -> bool {
        self.inner.read().contains(&character_id)
    }

    /// Atomically swaps in a fresh snapshot.
    pub fn replace(&self, characters: HashSet<u64>) {
        *self.inner.write() = Arc::new(characters);
    }

    /// Cheap clone of the current snapshot for iteration.
    pub fn snapshot(&self) -> Arc<HashSet<u64>> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
