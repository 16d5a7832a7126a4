//! Read side of the control surface: status, heat layer and view filters.

use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};

use super::failure;
use crate::{ConnectivityState, FilterCriteria, HeatPoint, Session, SignalApi};

// ---

pub fn router<A>() -> Router<Arc<Session<A>>>
where
    A: SignalApi + 'static,
{
    // ---
    Router::new()
        .route("/status", get(status::<A>))
        .route("/heat", get(heat::<A>))
        .route("/filters", get(get_filters::<A>).put(put_filters::<A>))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    connectivity: ConnectivityState,
    online: bool,
    pending: usize,
}

#[derive(Debug, Serialize)]
struct FiltersResponse {
    criteria: FilterCriteria,
    rendered: usize,
}

async fn status<A: SignalApi>(State(session): State<Arc<Session<A>>>) -> impl IntoResponse {
    // ---
    let pending = match session.pending().await {
        Ok(n) => n,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_UNREADABLE", e),
    };
    Json(StatusResponse {
        connectivity: session.state(),
        online: session.link().is_online(),
        pending,
    })
    .into_response()
}

async fn heat<A: SignalApi>(State(session): State<Arc<Session<A>>>) -> Json<Vec<HeatPoint>> {
    let points = session.heat_points();
    debug!("GET /heat - {} points", points.len());
    Json(points)
}

async fn get_filters<A: SignalApi>(
    State(session): State<Arc<Session<A>>>,
) -> Json<FilterCriteria> {
    Json(session.criteria())
}

/// Replace the view filters and pull a fresh heat layer for them.
async fn put_filters<A: SignalApi>(
    State(session): State<Arc<Session<A>>>,
    Json(criteria): Json<FilterCriteria>,
) -> impl IntoResponse {
    // ---
    info!("PUT /filters - {:?}", criteria);
    let criteria = session.set_criteria(criteria);

    match session.refresh().await {
        Ok(rendered) => Json(FiltersResponse { criteria, rendered }).into_response(),
        Err(e) => failure(StatusCode::BAD_GATEWAY, "REFRESH_FAILED", e),
    }
}
