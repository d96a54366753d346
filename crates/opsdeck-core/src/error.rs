use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("unknown action slug: {0}")]
    ActionNotFound(String),

    #[error("duplicate action slug in catalog: {0}")]
    DuplicateSlug(String),

    #[error("action '{0}' has no commands")]
    EmptyAction(String),

    #[error("action '{slug}' command {index} has an empty argv")]
    EmptyCommand { slug: String, index: usize },

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OpsError>;
