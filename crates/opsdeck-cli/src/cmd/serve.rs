use anyhow::Context;
use opsdeck_core::config::Config;
use opsdeck_server::AppState;
use std::path::Path;

pub fn run(root: &Path, bind: Option<String>) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    for w in config.validate() {
        tracing::warn!("config: {}", w.message);
    }
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::new(root.to_path_buf(), config)?;
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        println!(
            "opsdeck serving {} actions on http://{}  (PID {})",
            state.catalog.len(),
            listener.local_addr()?,
            std::process::id()
        );
        opsdeck_server::serve(state, listener).await
    })
}
