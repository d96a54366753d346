use axum::http::StatusCode;
use http_body_util::BodyExt;
use opsdeck_core::config::Config;
use opsdeck_core::{Action, CommandSpec};
use opsdeck_server::{build_router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn shell(script: &str) -> CommandSpec {
    CommandSpec::new(["sh", "-c", script])
}

/// Config with a few fast shell actions appended to the built-in catalog.
fn test_config() -> Config {
    Config {
        actions: vec![
            Action::new(
                "echo-twice",
                "Echo twice",
                "Prints two lines",
                "Test",
                vec![shell("echo one"), shell("echo two")],
            ),
            Action::new(
                "fail-second",
                "Fail second",
                "Second command exits 7",
                "Test",
                vec![shell("echo ok"), shell("echo boom; exit 7"), shell("echo never")],
            ),
        ],
        ..Config::default()
    }
}

fn app_with(dir: &TempDir, config: Config) -> axum::Router {
    let state = AppState::new(dir.path().to_path_buf(), config).unwrap();
    build_router(state)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// POST /run/{slug} and return (status, content-type, parsed NDJSON lines).
async fn run(app: axum::Router, slug: &str) -> (StatusCode, String, Vec<serde_json::Value>) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/run/{slug}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let events = text
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    (status, content_type, events)
}

fn kinds(events: &[serde_json::Value]) -> Vec<&str> {
    events
        .iter()
        .map(|e| e["type"].as_str().unwrap_or_default())
        .collect()
}

// ---------------------------------------------------------------------------
// Health and catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthz_reports_ok() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app_with(&dir, Config::default()), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["started_at"].is_string());
}

#[tokio::test]
async fn actions_lists_builtin_and_configured_sorted() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app_with(&dir, test_config()), "/actions").await;
    assert_eq!(status, StatusCode::OK);

    let slugs: Vec<&str> = body["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["slug"].as_str().unwrap())
        .collect();
    let mut sorted = slugs.clone();
    sorted.sort();
    assert_eq!(slugs, sorted);
    assert!(slugs.contains(&"fmt"));
    assert!(slugs.contains(&"echo-twice"));
    assert_eq!(body["action_count"], slugs.len());
}

// ---------------------------------------------------------------------------
// Action runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_unknown_slug_is_404() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_json(
        app_with(&dir, Config::default()),
        "/run/does-not-exist",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn run_malformed_slug_is_404() {
    let dir = TempDir::new().unwrap();
    let (status, _, _) = run(app_with(&dir, Config::default()), "Not_A_Slug").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn run_streams_ndjson_events_in_order() {
    let dir = TempDir::new().unwrap();
    let (status, content_type, events) = run(app_with(&dir, test_config()), "echo-twice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/x-ndjson");
    assert_eq!(
        kinds(&events),
        vec![
            "action_start",
            "command_start",
            "command_output",
            "command_end",
            "command_start",
            "command_output",
            "command_end",
            "action_complete",
        ]
    );
    assert_eq!(events[0]["command_count"], 2);
    assert_eq!(events[2]["line"], "one");
    assert_eq!(events[5]["line"], "two");
    assert_eq!(events[6]["status"], "success");
    assert!(events.iter().all(|e| e["timestamp"].is_string()));
}

#[tokio::test]
async fn run_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    let (status, _, events) = run(app_with(&dir, test_config()), "fail-second").await;
    assert_eq!(status, StatusCode::OK);

    let last = events.last().unwrap();
    assert_eq!(last["type"], "action_error");
    assert_eq!(last["command_index"], 1);
    assert_eq!(last["exit_code"], 7);
    assert!(!events.iter().any(|e| e["line"] == "never"));
    assert_eq!(
        events.iter().filter(|e| e["type"] == "command_start").count(),
        2
    );
}

// ---------------------------------------------------------------------------
// Supervised processes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn processes_start_idle() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app_with(&dir, Config::default()), "/processes").await;
    assert_eq!(status, StatusCode::OK);
    let roles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["node", "wallet"]);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["status"] == "idle"));
}

#[tokio::test]
async fn unknown_role_is_404() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get(app_with(&dir, Config::default()), "/processes/miner").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn join_without_peer_is_422_and_leaves_state_idle() {
    let dir = TempDir::new().unwrap();
    let state = AppState::new(dir.path().to_path_buf(), Config::default()).unwrap();

    let (status, body) = post_json(
        build_router(state.clone()),
        "/processes/node/start",
        serde_json::json!({ "mode": "join" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("peer"));

    let (_, node) = get(build_router(state), "/processes/node").await;
    assert_eq!(node["status"], "idle");
}

#[tokio::test]
async fn stop_when_idle_is_noop() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_json(
        app_with(&dir, Config::default()),
        "/processes/wallet/stop",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
}

#[tokio::test]
async fn missing_executable_is_500_with_log_path() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_json(
        app_with(&dir, Config::default()),
        "/processes/wallet/start",
        serde_json::json!({ "executable": "no-such-walletd-7731" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "not_found");
    assert!(body["log_path"].as_str().unwrap().ends_with("wallet.log"));
}

#[cfg(unix)]
#[tokio::test]
async fn start_conflict_then_stop() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let exe = dir.path().join("node.sh");
    std::fs::write(&exe, "#!/bin/sh\necho node up\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = Config::default();
    config.supervisor.grace_ms = 200;
    let state = AppState::new(dir.path().to_path_buf(), config).unwrap();
    let spec = serde_json::json!({ "executable": exe.display().to_string(), "passphrase": "pw" });

    let (status, body) =
        post_json(build_router(state.clone()), "/processes/node/start", spec.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "running");
    assert!(!body["command"].as_str().unwrap().contains(" pw"));

    let (status, _) = post_json(build_router(state.clone()), "/processes/node/start", spec).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post_json(
        build_router(state.clone()),
        "/processes/node/stop",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "exited");
    assert!(body["exit_code"].is_number());
}

// ---------------------------------------------------------------------------
// Node telemetry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_without_node_is_503() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get(app_with(&dir, Config::default()), "/node/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_sample_fallback_when_enabled() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.relay.sample_fallback = true;
    let (status, body) = get(app_with(&dir, config), "/node/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["hash_rate"].is_number());
}

#[tokio::test]
async fn wallet_notes_proxied_from_node() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/wallet/notes")
        .match_header("x-auth-token", "node-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"leaf_count": 3, "depth": 32}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.relay.url = Some(server.url());
    config.relay.token = Some("node-token".into());
    let (status, body) = get(app_with(&dir, config), "/node/wallet/notes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leaf_count"], 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn proxy_failure_is_502() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/metrics")
        .with_status(500)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.relay.url = Some(server.url());
    let (status, _) = get(app_with(&dir, config), "/node/metrics").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn event_stream_emits_sse_warning_when_unconfigured() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.relay.idle_warning_ms = 20;
    let app = app_with(&dir, config);

    let req = axum::http::Request::builder()
        .uri("/node/events/stream")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let data = frame.into_data().unwrap();
    let text = String::from_utf8(data.to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.contains("\"type\":\"warning\""));
}
