use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::sample;
use crate::state::AppState;
use crate::supervisor::Role;

async fn proxy(app: &AppState, path: &str, fallback: fn() -> Value) -> Result<Json<Value>, AppError> {
    let target = app.relay.target(app.supervisors.get(Role::Node)).await;
    match app.node.get_json(target.as_ref(), path).await {
        Ok(body) => Ok(Json(body)),
        Err(e) if app.relay.settings().sample_fallback => {
            debug!(path, error = %e, "serving sample data");
            Ok(Json(fallback()))
        }
        Err(e) => {
            warn!(path, error = %e, "node proxy failed");
            Err(e.into())
        }
    }
}

/// GET /node/metrics: proxied node telemetry.
pub async fn metrics(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    proxy(&app, "/metrics", sample::telemetry).await
}

/// GET /node/wallet/notes: proxied note commitment tree status.
pub async fn wallet_notes(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    proxy(&app, "/wallet/notes", sample::note_status).await
}

/// GET /node/events/stream: SSE relay of the node's live event channel.
///
/// The relay task lives exactly as long as the response stream and follows
/// the node across starts and restarts.
pub async fn events_stream(State(app): State<AppState>) -> impl IntoResponse {
    let events = app
        .relay
        .subscribe_node(app.supervisors.clone(), app.shutdown.child_token())
        .map(|payload| Ok::<Event, Infallible>(Event::default().data(payload.to_string())));
    Sse::new(events).keep_alive(KeepAlive::default())
}
