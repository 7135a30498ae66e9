//! Item ingestion, reinforcement, feedback and recall endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use strata_core::{ItemDraft, MemoryItem, ReinforceOutcome, SignalHints, SignalVector, Tier};

/// Request body for ingesting an item.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub content: String,
    pub source_agent_id: String,
    /// When the described event happened; defaults to now.
    pub event_time: Option<DateTime<Utc>>,
    pub explicit_importance: Option<f32>,
    #[serde(default)]
    pub goals: Vec<String>,
    pub hints: Option<SignalHints>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddItemQuery {
    /// Wait for the routing decision instead of returning once queued.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub item_id: String,
    pub status: &'static str,
}

/// Ingest an item.
/// POST /items
///
/// Returns 202 with the new id, or 201 with the routing outcome when
/// `?wait=true`.
pub async fn add_item(
    State(state): State<AppState>,
    Query(query): Query<AddItemQuery>,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;

    let event_time = request.event_time.unwrap_or_else(|| state.engine.now());
    let mut draft = ItemDraft::new(request.content, event_time, request.source_agent_id).with_goals(request.goals);
    if let Some(importance) = request.explicit_importance {
        draft = draft.with_importance(importance);
    }
    if let Some(hints) = request.hints {
        draft = draft.with_hints(hints);
    }

    if query.wait {
        let outcome = state.engine.ingest_and_wait(draft).await?;
        return Ok((StatusCode::CREATED, Json(outcome)).into_response());
    }

    let item_id = state.engine.ingest(draft).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            item_id,
            status: "queued",
        }),
    )
        .into_response())
}

/// Get an item wherever it lives.
/// GET /items/:id
pub async fn get_item(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<MemoryItem>> {
    state
        .engine
        .get_item(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Item not found: {}", id)))
}

/// Reinforce an item.
/// POST /items/:id/reinforce
pub async fn reinforce_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReinforceOutcome>> {
    let outcome = state.engine.reinforce(&id).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub was_correct: bool,
    pub observed_importance: f32,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub pending_feedback: usize,
}

/// Queue a routing-quality judgement for the next learning cycle.
/// POST /items/:id/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedbackResponse>)> {
    let Json(request) = payload?;
    state
        .engine
        .submit_feedback(&id, request.was_correct, request.observed_importance)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(FeedbackResponse {
            pending_feedback: state.engine.pending_feedback(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    #[serde(default)]
    pub signals: SignalVector,
    pub tier: Option<Tier>,
}

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub results: Vec<MemoryItem>,
}

/// Highest-priority items, optionally restricted to one tier.
/// POST /recall
pub async fn recall(
    State(state): State<AppState>,
    payload: Result<Json<RecallRequest>, JsonRejection>,
) -> ApiResult<Json<RecallResponse>> {
    let Json(request) = payload?;
    let results = state.engine.recall(&request.signals, request.tier).await?;
    Ok(Json(RecallResponse { results }))
}
