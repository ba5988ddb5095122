//! Error types for the contact directory.

use crate::types::ContactId;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport or parse failure while reading the contact set.
    ///
    /// Never surfaced by `get_all_contacts`; recovered as an empty result.
    #[error("Read failure: {0}")]
    ReadFailure(String),

    /// Transport rejected a write (add/update/delete).
    #[error("Write failure: {0}")]
    WriteFailure(String),

    #[error("Contact not found: {0}")]
    NotFound(ContactId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No async runtime available")]
    NoRuntime,
}

impl DirectoryError {
    /// Reclassify a substrate error as a failed read.
    pub fn into_read(self) -> Self {
        match self {
            e @ DirectoryError::ReadFailure(_) => e,
            other => DirectoryError::ReadFailure(other.to_string()),
        }
    }

    /// Reclassify a substrate error as a failed write.
    pub fn into_write(self) -> Self {
        match self {
            e @ DirectoryError::WriteFailure(_) => e,
            other => DirectoryError::WriteFailure(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(e: serde_json::Error) -> Self {
        DirectoryError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        DirectoryError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DirectoryError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DirectoryError::Transport(e.to_string())
    }
}

impl From<url::ParseError> for DirectoryError {
    fn from(e: url::ParseError) -> Self {
        DirectoryError::Config(format!("invalid URL: {e}"))
    }
}

impl From<toml::de::Error> for DirectoryError {
    fn from(e: toml::de::Error) -> Self {
        DirectoryError::Config(e.to_string())
    }
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;
