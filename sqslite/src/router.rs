//! HTTP router for sqslite

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqslite_sqs::{handle_request, QueueRegistry};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(registry: Arc<QueueRegistry>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // SQS: JSON and query requests to the endpoint root, query requests to a queue URL
        .route("/", post(handle_request))
        .route("/:account_id/:queue_name", post(handle_request))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn health_check(State(registry): State<Arc<QueueRegistry>>) -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "services": { "sqs": "available" },
        "queues": registry.len(),
    }))
}
