//! Live node event relay.
//!
//! A subscription owns one background task that connects to the node's
//! websocket, republishes each frame as JSON and reconnects after a fixed
//! delay whenever the connection fails or closes. The target is looked up
//! again before each attempt. The task stops when the
//! subscription's [`CancellationToken`] is cancelled or the stream is dropped.

use crate::sample;
use crate::supervisor::{Role, Supervisor, Supervisors};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use opsdeck_core::config::RelayConfig;
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

pub const UNCONFIGURED: &str = "node RPC URL is not configured";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid node RPC URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid auth token header")]
    InvalidToken,

    #[error("websocket: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub url: Option<String>,
    pub token: Option<String>,
    pub reconnect: Duration,
    pub idle_warning: Duration,
    pub sample_fallback: bool,
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            url: config.url.clone(),
            token: config.token.clone(),
            reconnect: Duration::from_millis(config.reconnect_ms.max(1)),
            idle_warning: Duration::from_millis(config.idle_warning_ms.max(1)),
            sample_fallback: config.sample_fallback,
        }
    }
}

/// Where to reach the node's RPC surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub base_url: String,
    pub token: Option<String>,
}

/// Map an `http(s)://host[:port]/...` base URL to `ws(s)://host[:port]/ws`.
pub fn ws_url(base: &str) -> Result<String, RelayError> {
    let mut url =
        reqwest::Url::parse(base).map_err(|_| RelayError::InvalidUrl(base.to_string()))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(RelayError::InvalidUrl(base.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| RelayError::InvalidUrl(base.to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

fn warning(message: &str) -> Value {
    json!({
        "type": "warning",
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Parse a frame as JSON; anything else is wrapped as `{"type":"raw"}`.
fn frame_payload(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "type": "raw", "data": text }))
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Looks up the current target; called before every connection attempt and
/// on every idle tick, so a node started or restarted later is picked up.
pub type TargetResolver = Arc<dyn Fn() -> BoxFuture<'static, Option<RelayTarget>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Relay {
    settings: RelaySettings,
}

impl Relay {
    pub fn new(settings: RelaySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// The configured URL, or the running node's own address and token.
    pub async fn target(&self, node: &Supervisor) -> Option<RelayTarget> {
        if let Some(url) = &self.settings.url {
            return Some(RelayTarget {
                base_url: url.clone(),
                token: self.settings.token.clone(),
            });
        }
        let (address, token) = node.coordinates().await?;
        Some(RelayTarget {
            base_url: format!("http://{address}"),
            token,
        })
    }

    /// Relay events from whatever [`Relay::target`] resolves to for the
    /// node supervisor at each attempt.
    pub fn subscribe_node(
        &self,
        supervisors: Arc<Supervisors>,
        cancel: CancellationToken,
    ) -> RelayStream {
        let relay = self.clone();
        let resolve: TargetResolver = Arc::new(move || {
            let relay = relay.clone();
            let supervisors = Arc::clone(&supervisors);
            async move { relay.target(supervisors.get(Role::Node)).await }.boxed()
        });
        self.subscribe(resolve, cancel)
    }

    /// Start relaying until `cancel` fires or the returned stream is dropped.
    pub fn subscribe(&self, resolve: TargetResolver, cancel: CancellationToken) -> RelayStream {
        let (tx, rx) = mpsc::channel(64);
        let settings = self.settings.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(relay_loop(resolve, settings, tx, task_cancel));
        RelayStream {
            inner: ReceiverStream::new(rx),
            _guard: cancel.drop_guard(),
        }
    }
}

/// Events from one subscription; dropping it cancels the relay task.
pub struct RelayStream {
    inner: ReceiverStream<Value>,
    _guard: DropGuard,
}

impl Stream for RelayStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn relay_loop(
    resolve: TargetResolver,
    settings: RelaySettings,
    tx: mpsc::Sender<Value>,
    cancel: CancellationToken,
) {
    let mut sample_index = 0usize;
    loop {
        let target = tokio::select! {
            _ = cancel.cancelled() => return,
            target = resolve() => target,
        };

        let (event, pause) = match target {
            None => {
                let event = if settings.sample_fallback {
                    sample::event(sample_index)
                } else {
                    warning(UNCONFIGURED)
                };
                sample_index = sample_index.wrapping_add(1);
                (event, settings.idle_warning)
            }
            Some(target) => {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return,
                    outcome = pump(&target, &tx) => outcome,
                };
                if tx.is_closed() {
                    return;
                }
                let message = match outcome {
                    Ok(()) => "node event stream closed".to_string(),
                    Err(e) => e.to_string(),
                };
                warn!(url = %target.base_url, error = %message, "relay disconnected; retrying");
                (warning(&message), settings.reconnect)
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// One connection: forward frames until the socket closes or errors.
async fn pump(target: &RelayTarget, tx: &mpsc::Sender<Value>) -> Result<(), RelayError> {
    let url = ws_url(&target.base_url)?;
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = target.token.as_deref().filter(|t| !t.is_empty()) {
        let value = HeaderValue::from_str(token).map_err(|_| RelayError::InvalidToken)?;
        request.headers_mut().insert("x-auth-token", value);
    }

    let (mut socket, _) = tokio_tungstenite::connect_async(request).await?;
    info!(url = %url, "relay connected");

    while let Some(message) = socket.next().await {
        let payload = match message? {
            Message::Text(text) => frame_payload(&text),
            Message::Binary(bytes) => frame_payload(&String::from_utf8_lossy(&bytes)),
            Message::Close(frame) => {
                debug!(?frame, "relay closed by peer");
                break;
            }
            _ => continue,
        };
        if tx.send(payload).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
