use crate::relay::{Relay, RelaySettings};
use crate::supervisor::{SupervisorSettings, Supervisors};
use crate::telemetry::NodeClient;
use chrono::{DateTime, Utc};
use opsdeck_core::config::Config;
use opsdeck_core::Catalog;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state passed to all route handlers.
///
/// Everything is built once at startup; handlers only clone `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub supervisors: Arc<Supervisors>,
    pub relay: Relay,
    pub node: NodeClient,
    pub started_at: DateTime<Utc>,
    /// Cancelled on server shutdown; every relay subscription is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the catalog, supervisors and relay from `config`. Fails when the
    /// catalog is inconsistent or the log directory cannot be created.
    pub fn new(root: PathBuf, config: Config) -> anyhow::Result<Self> {
        let catalog = Catalog::load(&root, &config)?;
        let supervisors =
            Supervisors::new(SupervisorSettings::from_config(&root, &config.supervisor))?;
        let relay_config = config.relay.clone().with_env_overrides();
        let relay = Relay::new(RelaySettings::from_config(&relay_config));
        let node = NodeClient::new()?;

        Ok(Self {
            root,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            supervisors: Arc::new(supervisors),
            relay,
            node,
            started_at: Utc::now(),
            shutdown: CancellationToken::new(),
        })
    }
}
