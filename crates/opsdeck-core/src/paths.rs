use crate::error::{OpsError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const OPSDECK_DIR: &str = ".opsdeck";
pub const LOGS_DIR: &str = ".opsdeck/logs";
pub const CONFIG_FILE: &str = ".opsdeck/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn opsdeck_dir(root: &Path) -> PathBuf {
    root.join(OPSDECK_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join(LOGS_DIR)
}

/// Append-only log file for one supervised role, e.g. `.opsdeck/logs/node.log`.
pub fn role_log_path(root: &Path, role: &str) -> PathBuf {
    logs_dir(root).join(format!("{role}.log"))
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(OpsError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
