use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;
use crate::supervisor::{LaunchSpec, ProcessState, Role};

fn parse_role(role: &str) -> Result<Role, AppError> {
    role.parse::<Role>().map_err(AppError::not_found)
}

/// GET /processes: every role's current state.
pub async fn list_processes(State(app): State<AppState>) -> Json<Vec<ProcessState>> {
    Json(app.supervisors.all().await)
}

/// GET /processes/{role}
pub async fn get_process(
    State(app): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<ProcessState>, AppError> {
    let role = parse_role(&role)?;
    Ok(Json(app.supervisors.get(role).status().await))
}

/// POST /processes/{role}/start: launch with the JSON `LaunchSpec` body.
///
/// 409 while the role is live, 422 for an invalid spec, 500 with the log
/// tail when the executable is missing or the process dies during startup.
pub async fn start_process(
    State(app): State<AppState>,
    Path(role): Path<String>,
    Json(spec): Json<LaunchSpec>,
) -> Result<Json<ProcessState>, AppError> {
    let role = parse_role(&role)?;
    info!(role = %role, "start requested");
    let state = app.supervisors.get(role).start(spec).await?;
    Ok(Json(state))
}

/// POST /processes/{role}/stop: graceful stop; a no-op when nothing runs.
pub async fn stop_process(
    State(app): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<ProcessState>, AppError> {
    let role = parse_role(&role)?;
    info!(role = %role, "stop requested");
    let state = app.supervisors.get(role).stop().await?;
    Ok(Json(state))
}
