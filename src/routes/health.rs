// src/routes/health.rs
//! Liveness endpoint for the local control surface.
//!
//! Sibling module in the `routes` directory (EMBP): the handler stays
//! private and the gateway merges the exported subrouter.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`. Touches neither the queue store nor the backend.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
