//! Pattern sharing endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use strata_core::types::ProposeOutcome;
use strata_core::{Pattern, PatternProposal, SharedPattern};

/// Propose a pattern (merged into an existing one with the same similarity key).
/// POST /patterns
pub async fn propose_pattern(
    State(state): State<AppState>,
    payload: Result<Json<PatternProposal>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProposeOutcome>)> {
    let Json(proposal) = payload?;
    let outcome = state.engine.propose_pattern(proposal)?;
    let status = if outcome.merged {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub agent_id: String,
    pub helpful: bool,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub pattern_id: String,
    pub vote_tally: i64,
}

/// Cast or replace a vote.
/// POST /patterns/:id/votes
pub async fn vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<VoteResponse>> {
    let Json(request) = payload?;
    let vote_tally = state.engine.vote(&request.agent_id, &id, request.helpful)?;
    Ok(Json(VoteResponse {
        pattern_id: id,
        vote_tally,
    }))
}

#[derive(Debug, Serialize)]
pub struct ShareableResponse {
    pub results: Vec<SharedPattern>,
}

/// Anonymized, noised view of every shareable pattern.
/// GET /patterns/shareable
pub async fn get_shareable(State(state): State<AppState>) -> ApiResult<Json<ShareableResponse>> {
    Ok(Json(ShareableResponse {
        results: state.engine.get_shareable_patterns(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub admin_id: String,
}

/// Clear a sensitive-content block.
/// POST /patterns/:id/override
pub async fn override_block(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<OverrideRequest>, JsonRejection>,
) -> ApiResult<Json<Pattern>> {
    let Json(request) = payload?;
    let pattern = state.engine.override_block(&id, &request.admin_id)?;
    Ok(Json(pattern))
}

/// Internal view of one pattern.
/// GET /patterns/:id
pub async fn get_pattern(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Pattern>> {
    state
        .engine
        .get_pattern(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Pattern not found: {}", id)))
}
