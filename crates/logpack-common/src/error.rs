//! Error types for LogPack

use thiserror::Error;

/// Result type alias for LogPack operations
pub type Result<T> = std::result::Result<T, PackError>;

/// Main error type shared by LogPack crates
#[derive(Error, Debug)]
pub enum PackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SHA-256 mismatch. expected={expected} got={actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid digest '{0}': expected 64 hexadecimal characters")]
    InvalidDigest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
