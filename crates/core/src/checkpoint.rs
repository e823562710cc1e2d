//! Durable resume cursors for ingestion streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which per-character history stream a checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Kills,
    Losses,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kills => "kills",
            Self::Losses => "losses",
        }
    }

    /// Stream name for one (kind, character) pair, e.g. `kills:93112`.
    pub fn stream_name(&self, character_id: u64) -> String {
        format!("{}:{}", self.as_str(), character_id)
    }
}

/// A resume cursor: the newest event already processed for a stream.
/// Advances monotonically and never moves backward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stream: String,
    pub last_seen_id: u64,
    pub last_seen_time: DateTime<Utc>,
}
