//! Upstream service clients for the killfeed pipeline.
//!
//! Every network call to the index or detail service goes through a
//! per-service circuit breaker wrapping a bounded retry, so one
//! degraded dependency fast-fails instead of queueing unbounded work
//! or starving calls to a healthy one.

pub mod breaker;
pub mod config;
pub mod detail;
pub mod fetcher;
pub mod index;
pub mod pushfeed;
pub mod queue;
pub mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use config::UpstreamConfig;
pub use detail::{DetailClient, KillmailDetail};
pub use fetcher::{HttpRecordFetcher, RecordFetcher};
pub use index::{HistoryEntry, HistorySource, IndexClient};
pub use pushfeed::{
    InboundMessage, OutboundMessage, PushConnector, PushSession, SubscriptionSet, WsConnector,
};
pub use queue::{HttpQueueClient, QueueSource};
pub use retry::{retry, RetryPolicy};
