//! Router assembly for the control plane HTTP surface.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::startup::ControlPlane;

use super::discovery_handlers::discovery_handler;
use super::request_context::request_context;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Unauthenticated liveness probe.
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok".to_string() }))
}

pub fn build_router(plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        // Matches /v2/discovery:{xds_type} and the versioned form; the
        // discovery segment is split on ':' in the handler.
        .route("/{api_version}/{service}", post(discovery_handler))
        .layer(middleware::from_fn(request_context))
        .layer(CorsLayer::permissive())
        .with_state(plane)
}
