//! Persistence contract for the killfeed pipeline.
//!
//! The pipeline consumes durable storage only through the
//! [`KillmailRepository`] trait; the engine behind it (and its query
//! language and migrations) is a deployment concern. The in-memory
//! implementation backs tests and local runs.

pub mod memory;
pub mod repository;

pub use memory::MemoryRepository;
pub use repository::{KillmailRepository, StoredKillmail};
