use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Summary API error: {0}")]
    SummaryApi(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Terminal rejections produced by the access gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Invalid host header: {host}")]
    HostNotAllowed { host: String },

    #[error("Access denied. IP {ip} not in allowed networks: {allowed}")]
    AccessDenied { ip: String, allowed: String },

    #[error("Invalid IP address: {addr}")]
    InvalidClient { addr: String },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Too many requests. Retry after {retry_after_secs} seconds")]
pub struct RateLimited {
    pub retry_after_secs: u64,
}

/// Collaborator failures that abort the processing pipeline.
///
/// Cloneable so that every caller waiting on a coalesced computation sees the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Error extracting content: {0}")]
    Extraction(String),

    #[error("Error summarizing text: {0}")]
    Summarization(String),

    #[error("Processing interrupted: {0}")]
    Interrupted(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid IP/network in config: {entry} ({reason})")]
    InvalidNetwork { entry: String, reason: String },
}
