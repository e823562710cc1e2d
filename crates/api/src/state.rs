//! Application state shared across handlers.

use std::sync::Arc;

use feed_core::TrackedRoster;
use storage::KillmailRepository;
use upstream::CircuitBreaker;
use worker::EnrichmentJob;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn KillmailRepository>,
    pub roster: Arc<TrackedRoster>,
    pub enrichment: Arc<EnrichmentJob>,
    /// Every breaker in the process, for the admin reset route.
    pub breakers: Arc<Vec<Arc<CircuitBreaker>>>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn KillmailRepository>,
        roster: Arc<TrackedRoster>,
        enrichment: Arc<EnrichmentJob>,
        breakers: Vec<Arc<CircuitBreaker>>,
    ) -> Self {
        Self {
            repository,
            roster,
            enrichment,
            breakers: Arc::new(breakers),
        }
    }
}
