use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::StreamExt;
use opsdeck_core::export::CatalogExport;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// GET /actions: the catalog in export form, sorted by slug.
pub async fn list_actions(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let export = CatalogExport::new(&app.catalog, Utc::now());
    Ok(Json(serde_json::to_value(&export)?))
}

/// POST /run/{slug}: run an action, streaming its events as NDJSON. Any slug
/// missing from the catalog, well-formed or not, is a 404.
///
/// The response ends after `action_complete` or `action_error`. A client that
/// disconnects early stops receiving events; the current command still runs
/// to completion.
pub async fn run_action(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let action = app.catalog.lookup(&slug)?.clone();
    info!(slug = %slug, "run requested");

    let lines = opsdeck_core::run_action(action, app.root.clone())
        .map(|record| record.to_ndjson_line());

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}
