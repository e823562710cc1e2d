//! Shared fixtures and mock upstreams for the integration tests.

pub mod fixtures;
pub mod mocks;
