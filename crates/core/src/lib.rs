//! Core types and error taxonomy for the killfeed ingestion pipeline.

pub mod checkpoint;
pub mod error;
pub mod killmail;
pub mod roster;

pub use checkpoint::*;
pub use error::{Error, Result};
pub use killmail::*;
pub use roster::*;
