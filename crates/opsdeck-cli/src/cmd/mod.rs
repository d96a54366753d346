pub mod config;
pub mod export;
pub mod launch;
pub mod list;
pub mod run;
pub mod serve;

use anyhow::Context;
use opsdeck_core::config::Config;
use opsdeck_core::Catalog;
use std::path::Path;

/// Load config and the merged catalog for `root`.
pub(crate) fn load_catalog(root: &Path) -> anyhow::Result<(Config, Catalog)> {
    let config = Config::load(root).context("failed to load config")?;
    let catalog = Catalog::load(root, &config).context("invalid action catalog")?;
    Ok((config, catalog))
}
