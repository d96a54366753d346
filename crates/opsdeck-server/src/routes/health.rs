use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /healthz: liveness probe.
pub async fn healthz(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "started_at": app.started_at,
        "actions": app.catalog.len(),
    }))
}
