//! Write side of the control surface: device reports and operator actions.
//!
//! The device (or whatever stands in for it) posts link and position reports;
//! the operator posts locate, capture and flush actions.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{failure, spawn_resync};
use crate::{
    Capture, LinkReport, Position, PositionError, Session, SignalApi, SubmitError,
};

// ---

pub fn router<A>() -> Router<Arc<Session<A>>>
where
    A: SignalApi + 'static,
{
    // ---
    Router::new()
        .route("/link", post(link::<A>))
        .route("/fix", post(fix::<A>))
        .route("/locate", post(locate::<A>))
        .route("/capture", post(capture::<A>))
        .route("/flush", post(flush::<A>))
        .route("/carrier", get(carrier::<A>))
}

/// A position fix, or the reason the device could not produce one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixReport {
    Position(Position),
    Failed { error: PositionError },
}

#[derive(Debug, Serialize)]
struct LinkResponse {
    online: bool,
    resync: bool,
}

async fn link<A: SignalApi + 'static>(
    State(session): State<Arc<Session<A>>>,
    Json(report): Json<LinkReport>,
) -> Json<LinkResponse> {
    // ---
    let online = report.online;
    let change = session.update_link(report);
    if change.came_online {
        spawn_resync(session.clone());
    }
    Json(LinkResponse {
        online,
        resync: change.came_online,
    })
}

async fn fix<A: SignalApi>(
    State(session): State<Arc<Session<A>>>,
    Json(report): Json<FixReport>,
) -> StatusCode {
    // ---
    session.report_fix(match report {
        FixReport::Position(position) => Ok(position),
        FixReport::Failed { error } => Err(error),
    });
    StatusCode::NO_CONTENT
}

async fn locate<A: SignalApi>(State(session): State<Arc<Session<A>>>) -> Response {
    // ---
    match session.locate().await {
        Ok(outcome) => {
            info!("POST /locate - {:?}", outcome);
            Json(outcome).into_response()
        }
        Err(e) => position_failure(e),
    }
}

async fn capture<A: SignalApi>(
    State(session): State<Arc<Session<A>>>,
    Json(capture): Json<Capture>,
) -> Response {
    // ---
    match session.capture(capture).await {
        Ok(outcome) => {
            info!("POST /capture - {:?}", outcome);
            Json(outcome).into_response()
        }
        Err(e) => submit_failure(e),
    }
}

async fn flush<A: SignalApi>(State(session): State<Arc<Session<A>>>) -> Response {
    // ---
    match session.flush().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!("POST /flush failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_UNREADABLE", e)
        }
    }
}

async fn carrier<A: SignalApi>(State(session): State<Arc<Session<A>>>) -> Response {
    // ---
    match session.detect_carrier().await {
        Ok(carrier) => Json(json!({ "carrier": carrier })).into_response(),
        Err(e) => failure(StatusCode::BAD_GATEWAY, "CARRIER_LOOKUP_FAILED", e),
    }
}

// ---

fn position_failure(e: PositionError) -> Response {
    // ---
    let (status, code) = match e {
        PositionError::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
        PositionError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "POSITION_UNAVAILABLE"),
        PositionError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "POSITION_TIMEOUT"),
    };
    failure(status, code, e)
}

fn submit_failure(e: SubmitError) -> Response {
    // ---
    if e.is_input_validation() {
        let code = match e {
            SubmitError::WifiPolicy => "WIFI_POLICY",
            _ => "MISSING_CARRIER",
        };
        return failure(StatusCode::UNPROCESSABLE_ENTITY, code, e);
    }
    match e {
        SubmitError::Position(p) => position_failure(p),
        _ => {
            warn!("POST /capture could not queue: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_UNWRITABLE", e)
        }
    }
}
