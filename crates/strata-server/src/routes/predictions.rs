//! Prediction endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use strata_core::types::VerificationReport;
use strata_core::{ObservedOutcome, Prediction, PredictionContext, StrataError};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub horizon_secs: i64,
    /// Defaults to the current focus (or fresh) signal mean.
    pub context: Option<PredictionContext>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub results: Vec<Prediction>,
}

/// Generate predictions from the shareable patterns.
/// POST /predictions
pub async fn generate_predictions(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let Json(request) = payload?;
    let horizon = Duration::try_seconds(request.horizon_secs)
        .ok_or_else(|| StrataError::invalid_field("horizon_secs", "horizon_secs is out of range"))?;
    let results = state.engine.generate_predictions(horizon, request.context)?;
    Ok((StatusCode::CREATED, Json(GenerateResponse { results })))
}

/// GET /predictions/:id
pub async fn get_prediction(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Prediction>> {
    state
        .engine
        .get_prediction(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Prediction not found: {}", id)))
}

/// Reconcile a prediction with what happened.
/// POST /predictions/:id/verify
pub async fn verify_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ObservedOutcome>, JsonRejection>,
) -> ApiResult<Json<VerificationReport>> {
    let Json(outcome) = payload?;
    let report = state.engine.verify(&id, outcome).await?;
    Ok(Json(report))
}
