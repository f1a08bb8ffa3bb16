use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaOpsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Metadata probe error: {0}")]
    Probe(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid split configuration: {0}")]
    InvalidConfiguration(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Permission denied: {0}")]
    Unauthorized(String),

    #[error("Step timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MediaOpsError>;

/// Coarse classification handed back to callers in response envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Unauthorized,
    Internal,
}

impl MediaOpsError {
    /// Map an error onto the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaOpsError::FileNotFound(_) | MediaOpsError::OperationNotFound(_) => {
                ErrorKind::NotFound
            }
            MediaOpsError::InvalidArgument(_) | MediaOpsError::InvalidConfiguration(_) => {
                ErrorKind::InvalidArgument
            }
            MediaOpsError::Unauthorized(_) => ErrorKind::Unauthorized,
            MediaOpsError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::Unauthorized,
                std::io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
                _ => ErrorKind::Internal,
            },
            _ => ErrorKind::Internal,
        }
    }

    /// Convert an IO failure on a user-supplied path into a typed error
    pub fn from_path_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => MediaOpsError::FileNotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                MediaOpsError::Unauthorized(path.display().to_string())
            }
            _ => MediaOpsError::Io(err),
        }
    }
}
