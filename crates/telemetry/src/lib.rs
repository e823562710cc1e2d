//! Internal telemetry for the killfeed ingestion pipeline.
//!
//! Aggregate counters and breaker/feed health are the operator
//! surface; individual events never raise alerts.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
