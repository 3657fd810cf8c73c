//! Error types for the sidecar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("Invalid port range: start {start} exceeds end {end}")]
    InvalidRange { start: u16, end: u16 },

    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection enumeration error: {0}")]
    Enumeration(String),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<reqwest::Error> for SidecarError {
    fn from(err: reqwest::Error) -> Self {
        SidecarError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SidecarError>;
