//! Error types for block program validation and execution

use thiserror::Error;

use crate::block::ValidationError;

pub type Result<T> = std::result::Result<T, CentoError>;

#[derive(Error, Debug)]
pub enum CentoError {
    #[error("Invalid program: {0}")]
    Validation(#[from] ValidationError),

    #[error("Motion channel is not connected")]
    ChannelUnavailable,

    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Program store error: {0}")]
    Store(String),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
