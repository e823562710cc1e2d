//! Periodic tracked-roster refresh.

use std::sync::Arc;

use tracing::{info, warn};

use feed_core::{Result, RosterSource, TrackedRoster};
use telemetry::metrics;

/// Pulls the roster from its source and swaps the shared snapshot.
pub struct RosterRefreshWorker {
    source: Arc<dyn RosterSource>,
    roster: Arc<TrackedRoster>,
}

impl RosterRefreshWorker {
    pub fn new(source: Arc<dyn RosterSource>, roster: Arc<TrackedRoster>) -> Self {
        Self { source, roster }
    }

    /// One refresh cycle. A failed pull keeps the previous snapshot;
    /// stale membership beats an empty one.
    pub async fn refresh(&self) -> Result<usize> {
        match self.source.tracked_characters().await {
            Ok(characters) => {
                let count = characters.len();
                self.roster.replace(characters);
                metrics().tracked_characters.set(count as u64);
                info!(tracked = count, "roster refreshed");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "roster refresh failed, keeping previous snapshot");
                Err(err)
            }
        }
    }
}
