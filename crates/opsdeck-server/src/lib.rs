pub mod error;
pub mod relay;
pub mod routes;
pub mod sample;
pub mod state;
pub mod supervisor;
pub mod telemetry;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(routes::health::healthz))
        // Action catalog
        .route("/actions", get(routes::actions::list_actions))
        .route("/run/{slug}", post(routes::actions::run_action))
        // Supervised processes
        .route("/processes", get(routes::processes::list_processes))
        .route("/processes/{role}", get(routes::processes::get_process))
        .route(
            "/processes/{role}/start",
            post(routes::processes::start_process),
        )
        .route(
            "/processes/{role}/stop",
            post(routes::processes::stop_process),
        )
        // Node telemetry
        .route("/node/metrics", get(routes::node::metrics))
        .route("/node/wallet/notes", get(routes::node::wallet_notes))
        .route("/node/events/stream", get(routes::node::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve on a pre-bound listener until Ctrl-C or SIGTERM, then cancel relay
/// subscriptions and stop every supervised process (wallet first).
pub async fn serve(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let shutdown = app_state.shutdown.clone();
    let supervisors = app_state.supervisors.clone();
    let app = build_router(app_state);

    info!("opsdeck listening on http://{addr}");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = signal_token.cancelled() => {}
            }
            signal_token.cancel();
        })
        .await?;

    info!("stopping supervised processes");
    supervisors.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl-C");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
