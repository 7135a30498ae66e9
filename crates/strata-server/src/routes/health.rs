//! Health and stats endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;
use strata_core::EngineStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub background_jobs: bool,
    pub queued_classifications: usize,
    pub version: String,
}

/// Health check endpoint.
/// GET /health
///
/// Reports `degraded` while any maintenance job's latest run failed.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let status = if state.engine.health().is_degraded() {
        "degraded"
    } else {
        "healthy"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        background_jobs: state.has_runtime().await,
        queued_classifications: state.engine.queued_jobs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Observability snapshot.
/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<EngineStats>> {
    Ok(Json(state.engine.get_stats().await))
}
