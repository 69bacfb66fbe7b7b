//! Error types for LogPack CLI
//!
//! User-facing errors with clear messages and, where there is one, a hint at
//! what to do next.

use logpack_common::PackError;
use logpack_engine::EngineError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Loading or querying the pack failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Checksum, digest or configuration problem
    #[error(transparent)]
    Pack(#[from] PackError),

    /// Preset id not among the built-in queries
    #[error("Unknown preset '{0}'. Run 'logpack presets' to list available queries.")]
    UnknownPreset(String),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or command-line flags.")]
    Config(String),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_message_passes_through() {
        let err: CliError = PackError::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "SHA-256 mismatch. expected=aa got=bb");
    }

    #[test]
    fn test_unknown_preset_hint() {
        let err = CliError::UnknownPreset("nope".to_string());
        assert!(err.to_string().contains("logpack presets"));
    }
}
