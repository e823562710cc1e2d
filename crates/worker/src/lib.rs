//! Background workers for the killfeed pipeline.
//!
//! All three feeds converge here:
//! - Coordinator (the skip/partial/full decision and the atomic write)
//! - Backfill (checkpointed per-character history catch-up)
//! - Enrichment (partial → full upgrades on a timer)
//! - Realtime (push-subscription and long-poll consumers)
//! - Roster refresh (tracked-character snapshot swaps)

pub mod backfill;
pub mod coordinator;
pub mod enrichment;
pub mod realtime;
pub mod roster_refresh;
pub mod scheduler;

pub use backfill::{BackfillConfig, BackfillOrchestrator};
pub use coordinator::{IngestOutcome, IngestionCoordinator};
pub use enrichment::{EnrichmentJob, EnrichmentReport};
pub use realtime::{PushFeedWorker, QueueWorker};
pub use roster_refresh::RosterRefreshWorker;
pub use scheduler::{WorkerConfig, WorkerScheduler};
