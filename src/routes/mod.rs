//! Local control surface gateway.
//!
//! Each sibling file exports a `router()` for its endpoints; this module
//! merges them and attaches the shared session as state.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde_json::json;

use crate::{Session, SignalApi};

mod contribute;
mod health;
mod status;

// ---

pub fn router<A>(session: Arc<Session<A>>) -> Router
where
    A: SignalApi + 'static,
{
    // ---
    Router::new()
        .merge(status::router())
        .merge(contribute::router())
        .merge(health::router())
        .with_state(session)
}

/// JSON error body shared by every handler: `{error, message}`.
fn failure(status: StatusCode, code: &str, message: impl ToString) -> Response {
    (
        status,
        Json(json!({ "error": code, "message": message.to_string() })),
    )
        .into_response()
}

/// Run a flush then a refresh in the background.
fn spawn_resync<A>(session: Arc<Session<A>>)
where
    A: SignalApi + 'static,
{
    tokio::spawn(async move { session.resync().await });
}
