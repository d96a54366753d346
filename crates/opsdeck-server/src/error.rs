use crate::supervisor::SupervisorError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opsdeck_core::OpsError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 404 Not Found errors
// ---------------------------------------------------------------------------

/// Private sentinel carrying an explicit HTTP 404 through the `anyhow::Error`
/// chain, for lookups that have no typed error of their own (e.g. roles).
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 404 Not Found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

fn json(status: StatusCode, body: serde_json::Value) -> Response {
    (status, axum::Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            return json(StatusCode::NOT_FOUND, serde_json::json!({ "error": n.0.clone() }));
        }

        if let Some(e) = self.0.downcast_ref::<SupervisorError>() {
            let error = e.to_string();
            return match e {
                SupervisorError::AlreadyRunning { pid, .. } => json(
                    StatusCode::CONFLICT,
                    serde_json::json!({ "error": error, "pid": pid }),
                ),
                SupervisorError::Invalid(_) => json(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    serde_json::json!({ "error": error }),
                ),
                SupervisorError::StartupFailed(failure) => json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({
                        "error": error,
                        "kind": failure.kind,
                        "log_tail": failure.log_tail,
                        "log_path": failure.log_path,
                        "exit_code": failure.exit_code,
                    }),
                ),
                SupervisorError::LogDir { .. } => json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": error }),
                ),
            };
        }

        let status = if let Some(e) = self.0.downcast_ref::<OpsError>() {
            match e {
                OpsError::ActionNotFound(_) => StatusCode::NOT_FOUND,
                OpsError::InvalidSlug(_) => StatusCode::BAD_REQUEST,
                OpsError::DuplicateSlug(_) => StatusCode::CONFLICT,
                OpsError::EmptyAction(_) | OpsError::EmptyCommand { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                OpsError::HomeNotFound
                | OpsError::Io(_)
                | OpsError::Yaml(_)
                | OpsError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(e) = self.0.downcast_ref::<TelemetryError>() {
            match e {
                TelemetryError::Unconfigured => StatusCode::SERVICE_UNAVAILABLE,
                TelemetryError::Request { .. } => StatusCode::BAD_GATEWAY,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        json(status, serde_json::json!({ "error": self.0.to_string() }))
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
