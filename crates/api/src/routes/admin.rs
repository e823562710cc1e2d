//! Operational endpoints: metrics, loss lookups, manual enrichment,
//! breaker reset.

use axum::{
    extract::{Path, State},
    Json,
};
use telemetry::{metrics, MetricsSnapshot};
use tracing::info;

use feed_core::Loss;
use worker::EnrichmentReport;

use crate::response::{ApiError, BreakerResetResponse};
use crate::state::AppState;

/// GET /metrics - Current metrics snapshot.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}

/// GET /characters/:character_id/losses - Loss views for one tracked
/// character, newest first.
pub async fn losses_handler(
    State(state): State<AppState>,
    Path(character_id): Path<u64>,
) -> Result<Json<Vec<Loss>>, ApiError> {
    if !state.roster.contains(character_id) {
        return Err(ApiError::not_found(format!(
            "character {character_id} is not tracked"
        )));
    }
    let losses = state.repository.find_losses(character_id).await?;
    Ok(Json(losses))
}

/// POST /admin/enrichment/run - Run one enrichment batch now.
pub async fn enrichment_run_handler(
    State(state): State<AppState>,
) -> Result<Json<EnrichmentReport>, ApiError> {
    info!("manual enrichment run requested");
    let report = state.enrichment.run().await?;
    Ok(Json(report))
}

/// POST /admin/breakers/reset - Close every circuit breaker.
pub async fn breakers_reset_handler(State(state): State<AppState>) -> Json<BreakerResetResponse> {
    let mut reset = Vec::with_capacity(state.breakers.len());
    for breaker in state.breakers.iter() {
        breaker.reset();
        reset.push(breaker.service().to_string());
    }
    info!(breakers = ?reset, "circuit breakers reset");
    Json(BreakerResetResponse { reset })
}
