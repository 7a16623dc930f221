//! Infrastructure error types

use std::path::PathBuf;

use bulwark_domain::ConfigError;
use thiserror::Error;

/// Errors raised while loading settings or wiring infrastructure
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("No config file found in any of the standard locations")]
    NoConfigFile,

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML format: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for environment variable {key}: '{value}'")]
    InvalidEnv { key: String, value: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialise tracing: {0}")]
    Tracing(String),
}

/// Result type alias for infrastructure operations
pub type InfraResult<T> = Result<T, InfraError>;
