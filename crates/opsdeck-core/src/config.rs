use crate::error::Result;
use crate::paths;
use crate::types::Action;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ---------------------------------------------------------------------------
// SupervisorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Startup grace window: a process that dies within it failed to start.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// How long `stop` waits after SIGTERM before force-killing.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Number of recent log lines kept in memory per role.
    #[serde(default = "default_tail_capacity")]
    pub tail_capacity: usize,
    /// Directories searched for node/wallet binaries before `PATH`.
    #[serde(default)]
    pub search_path: Vec<PathBuf>,
}

fn default_grace_ms() -> u64 {
    1500
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

fn default_tail_capacity() -> usize {
    200
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            tail_capacity: default_tail_capacity(),
            search_path: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Node RPC base URL, e.g. `http://127.0.0.1:8080`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
    /// Interval between warnings while no node channel is configured.
    #[serde(default = "default_idle_warning_ms")]
    pub idle_warning_ms: u64,
    /// Use canned telemetry when there is no real node data. The proxy
    /// endpoints fall back when the node is unconfigured or unreachable; the
    /// event stream substitutes sample events only while no node is
    /// configured and keeps reporting disconnects as warnings. Off unless
    /// explicitly enabled.
    #[serde(default)]
    pub sample_fallback: bool,
}

fn default_reconnect_ms() -> u64 {
    3000
}

fn default_idle_warning_ms() -> u64 {
    5000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            reconnect_ms: default_reconnect_ms(),
            idle_warning_ms: default_idle_warning_ms(),
            sample_fallback: false,
        }
    }
}

impl RelayConfig {
    /// Apply `NODE_RPC_URL` / `NODE_RPC_TOKEN` from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("NODE_RPC_URL") {
            if !url.trim().is_empty() {
                self.url = Some(url.trim().trim_end_matches('/').to_string());
            }
        }
        if let Ok(token) = std::env::var("NODE_RPC_TOKEN") {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    /// Extra actions appended to the built-in catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Config {
    /// Load `.opsdeck/config.yaml`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.supervisor.grace_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "supervisor.grace_ms is 0: early crashes will be reported as running"
                    .to_string(),
            });
        }
        if self.supervisor.stop_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "supervisor.stop_timeout_ms is 0: stop will force-kill immediately"
                    .to_string(),
            });
        }
        if self.supervisor.tail_capacity == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "supervisor.tail_capacity must be at least 1".to_string(),
            });
        }
        if self.relay.reconnect_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "relay.reconnect_ms is 0: reconnect attempts will spin".to_string(),
            });
        }
        if let Some(url) = &self.relay.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("relay.url '{url}' must start with http:// or https://"),
                });
            }
        }
        for action in &self.actions {
            if action.commands.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("action '{}' has no commands", action.slug),
                });
            }
        }

        warnings
    }
}
