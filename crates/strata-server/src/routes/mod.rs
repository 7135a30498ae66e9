//! Route definitions for the REST API.

mod health;
mod items;
mod patterns;
mod predictions;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/stats", get(health::get_stats))
        // Items
        .route("/items", post(items::add_item))
        .route("/items/:id", get(items::get_item))
        .route("/items/:id/reinforce", post(items::reinforce_item))
        .route("/items/:id/feedback", post(items::submit_feedback))
        .route("/recall", post(items::recall))
        // Patterns
        .route("/patterns", post(patterns::propose_pattern))
        .route("/patterns/shareable", get(patterns::get_shareable))
        .route("/patterns/:id", get(patterns::get_pattern))
        .route("/patterns/:id/votes", post(patterns::vote))
        .route("/patterns/:id/override", post(patterns::override_block))
        // Predictions
        .route("/predictions", post(predictions::generate_predictions))
        .route("/predictions/:id", get(predictions::get_prediction))
        .route("/predictions/:id/verify", post(predictions::verify_prediction))
        .with_state(state)
}

pub use health::*;
pub use items::*;
pub use patterns::*;
pub use predictions::*;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use strata_core::{EngineConfig, TieringEngine};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<TieringEngine>) {
        let engine = TieringEngine::builder(EngineConfig::default()).build().unwrap();
        (create_router(AppState::new(engine.clone())), engine)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = tokio_test::assert_ok!(app.clone().oneshot(request).await);
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let (app, _engine) = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["background_jobs"], false);
    }

    #[tokio::test]
    async fn test_add_item_and_wait_routes_to_focus() {
        let (app, _engine) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/items?wait=true",
            Some(json!({
                "content": "Call the landlord about the leak",
                "source_agent_id": "agent-a",
                "explicit_importance": 1.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tier"], "focus");

        let id = body["item_id"].as_str().unwrap().to_string();
        let (status, item) = send(&app, "GET", &format!("/items/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["tier"], "focus");
    }

    #[tokio::test]
    async fn test_add_item_without_wait_is_accepted() {
        let (app, _engine) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/items",
            Some(json!({ "content": "Watered the plants", "source_agent_id": "agent-a" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "queued");
        assert!(body["item_id"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_item_is_422() {
        let (app, _engine) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/items",
            Some(json!({ "content": "   ", "source_agent_id": "agent-a" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["code"].as_str().unwrap().starts_with("VAL_"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_422() {
        let (app, _engine) = app();
        let request = Request::builder()
            .method("POST")
            .uri("/recall")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_404() {
        let (app, _engine) = app();
        let (status, _) = send(&app, "POST", "/items/missing/reinforce", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/items/missing/feedback",
            Some(json!({ "was_correct": true, "observed_importance": 0.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/patterns/missing/votes",
            Some(json!({ "agent_id": "agent-a", "helpful": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/predictions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reinforce_and_feedback_round() {
        let (app, engine) = app();
        let (_, body) = send(
            &app,
            "POST",
            "/items?wait=true",
            Some(json!({
                "content": "Dentist appointment moved to Friday",
                "source_agent_id": "agent-a",
                "hints": { "intensity": 0.4 }
            })),
        )
        .await;
        let id = body["item_id"].as_str().unwrap().to_string();

        let (status, outcome) = send(&app, "POST", &format!("/items/{}/reinforce", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["reinforcement_count"], 1);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/items/{}/feedback", id),
            Some(json!({ "was_correct": false, "observed_importance": 0.9 })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["pending_feedback"], 1);
        assert_eq!(engine.pending_feedback(), 1);
    }

    #[tokio::test]
    async fn test_recall_with_empty_query() {
        let (app, _engine) = app();
        send(
            &app,
            "POST",
            "/items?wait=true",
            Some(json!({
                "content": "Renew the car insurance",
                "source_agent_id": "agent-a",
                "explicit_importance": 1.0
            })),
        )
        .await;

        let (status, body) = send(&app, "POST", "/recall", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, "POST", "/recall", Some(json!({ "tier": "archival" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pattern_propose_merge_and_vote() {
        let (app, _engine) = app();
        let proposal = |agent: &str| {
            json!({
                "agent_id": agent,
                "pattern_type": "routine",
                "description_payload": { "habit": "gym on monday evenings" }
            })
        };

        let (status, first) = send(&app, "POST", "/patterns", Some(proposal("agent-a"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, second) = send(&app, "POST", "/patterns", Some(proposal("agent-b"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["pattern_id"], second["pattern_id"]);
        assert_eq!(second["occurrence_count"], 2);

        let id = first["pattern_id"].as_str().unwrap().to_string();
        let (status, body) = send(
            &app,
            "POST",
            &format!("/patterns/{}/votes", id),
            Some(json!({ "agent_id": "agent-c", "helpful": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vote_tally"], 1);

        let (status, body) = send(&app, "GET", "/patterns/shareable", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["results"].is_array());
    }

    #[tokio::test]
    async fn test_predictions_reject_invalid_horizon() {
        let (app, _engine) = app();
        let (status, _) = send(&app, "POST", "/predictions", Some(json!({ "horizon_secs": 0 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &app,
            "POST",
            "/predictions",
            Some(json!({ "horizon_secs": i64::MAX })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["code"].as_str().unwrap().starts_with("VAL_"));

        let (status, body) = send(&app, "POST", "/predictions", Some(json!({ "horizon_secs": 3600 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let (app, _engine) = app();
        let (status, body) = send(&app, "GET", "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["integration_score"].is_number());
        assert_eq!(body["health"]["degraded"], false);
    }
}
