//! Error types for the ingestion and query pipeline

use logpack_common::PackError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while loading a pack or serving queries against it
#[derive(Error, Debug)]
pub enum EngineError {
    /// Server answered with a non-success status
    #[error("Download failed: {status} {message}")]
    Transport { status: u16, message: String },

    /// HTTP request could not be completed
    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Log pack '{0}' not found")]
    PackNotFound(String),

    #[error("No pack data provided")]
    NoPackData,

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("manifest.json not found in pack")]
    MissingManifest,

    #[error("Invalid manifest.json: {0}")]
    InvalidManifest(String),

    #[error("Invalid archive member path '{0}'")]
    InvalidMemberPath(String),

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Database not initialized")]
    NotReady,

    #[error("Pack load rejected: orchestrator is already {0}")]
    LoadRejected(String),

    #[error("Pack load failed: {0}")]
    LoadFailed(String),

    #[error("Query {id} failed: {message}")]
    QueryFailed { id: String, message: String },

    #[error("Query {id} timed out after {}s", timeout.as_secs())]
    QueryTimeout { id: String, timeout: Duration },

    #[error("Session closed")]
    SessionClosed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),

    #[error(transparent)]
    Pack(#[from] PackError),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Pack(PackError::Io(err))
    }
}
