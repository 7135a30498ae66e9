//! strata-server - REST API server for strata.
//!
//! Exposes the tiering engine over HTTP: ingestion, reinforcement, recall,
//! router feedback, pattern sharing and predictions.
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{EngineConfig, TieringEngine};
//! use strata_server::{create_server, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = TieringEngine::builder(EngineConfig::default()).build().unwrap();
//!     let app = create_server(AppState::new(engine));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

/// Per-route in-flight request ceiling when none is configured.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 256;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    create_server_with_limit(state, DEFAULT_CONCURRENCY_LIMIT)
}

/// Create the server with an explicit per-route in-flight request ceiling.
pub fn create_server_with_limit(state: AppState, max_in_flight: usize) -> Router {
    routes::create_router(state)
        .layer(ConcurrencyLimitLayer::new(max_in_flight.max(1)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
