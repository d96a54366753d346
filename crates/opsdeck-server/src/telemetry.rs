//! Thin proxy for the node's HTTP telemetry endpoints.

use crate::relay::RelayTarget;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("node RPC URL is not configured")]
    Unconfigured,

    #[error("node request to {url} failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// GET `{base_url}{path}` with the node's auth token, expecting JSON.
    pub async fn get_json(
        &self,
        target: Option<&RelayTarget>,
        path: &str,
    ) -> Result<Value, TelemetryError> {
        let target = target.ok_or(TelemetryError::Unconfigured)?;
        let url = format!("{}{path}", target.base_url.trim_end_matches('/'));
        let mut req = self.http.get(&url);
        if let Some(token) = target.token.as_deref().filter(|t| !t.is_empty()) {
            req = req.header("x-auth-token", token);
        }
        let wrap = |source| TelemetryError::Request {
            url: url.clone(),
            source,
        };
        let resp = req.send().await.map_err(wrap)?;
        let resp = resp.error_for_status().map_err(wrap)?;
        resp.json::<Value>().await.map_err(wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: String, token: Option<&str>) -> RelayTarget {
        RelayTarget {
            base_url: url,
            token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn get_json_forwards_token_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/metrics")
            .match_header("x-auth-token", "abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hash_rate": 42.0, "best_height": 7}"#)
            .create_async()
            .await;

        let client = NodeClient::new().unwrap();
        let t = target(server.url(), Some("abc"));
        let body = client.get_json(Some(&t), "/metrics").await.unwrap();
        assert_eq!(body["best_height"], 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/wallet/notes")
            .with_status(503)
            .create_async()
            .await;

        let client = NodeClient::new().unwrap();
        let t = target(format!("{}/", server.url()), None);
        let err = client.get_json(Some(&t), "/wallet/notes").await.unwrap_err();
        assert!(matches!(err, TelemetryError::Request { .. }));
        assert!(err.to_string().contains("/wallet/notes"));
    }

    #[tokio::test]
    async fn missing_target_is_unconfigured() {
        let client = NodeClient::new().unwrap();
        let err = client.get_json(None, "/metrics").await.unwrap_err();
        assert!(matches!(err, TelemetryError::Unconfigured));
    }
}
