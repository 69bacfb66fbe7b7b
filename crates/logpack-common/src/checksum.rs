//! Checksum utilities for pack verification
//!
//! Packs are verified with a lowercase hex SHA-256 digest computed over the
//! compressed archive exactly as it was received.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Length of a hex-encoded SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Outcome of comparing a computed digest against an optional expected one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_digest: Option<String>,
    pub actual_digest: String,
    pub matches: bool,
}

impl IntegrityResult {
    /// True when an expected digest was supplied and it matched.
    pub fn is_verified(&self) -> bool {
        self.expected_digest.is_some() && self.matches
    }

    /// Turn a mismatch into a [`PackError::ChecksumMismatch`].
    pub fn into_result(self) -> Result<Self> {
        match (&self.expected_digest, self.matches) {
            (Some(expected), false) => Err(PackError::ChecksumMismatch {
                expected: expected.clone(),
                actual: self.actual_digest,
            }),
            _ => Ok(self),
        }
    }
}

/// Compute SHA-256 checksum of bytes
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA-256 checksum of any readable source
pub fn compute_reader_checksum<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute SHA-256 checksum of a file
pub fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path.as_ref())?;
    compute_reader_checksum(&mut file)
}

/// Normalize a caller-supplied digest to lowercase hex, rejecting anything that
/// is not a SHA-256 digest.
pub fn normalize_digest(digest: &str) -> Result<String> {
    let trimmed = digest.trim();
    if trimmed.len() != SHA256_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PackError::InvalidDigest(digest.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Digest `data` and compare it with `expected` when one is supplied.
///
/// Without an expected digest the comparison is skipped and the result
/// reports `matches = true`; callers that need to know whether the content was
/// actually verified should use [`IntegrityResult::is_verified`].
pub fn verify_digest(data: &[u8], expected: Option<&str>) -> Result<IntegrityResult> {
    let actual_digest = compute_checksum(data);
    let expected_digest = expected.map(normalize_digest).transpose()?;
    let matches = expected_digest
        .as_deref()
        .map_or(true, |expected| expected == actual_digest);

    Ok(IntegrityResult {
        expected_digest,
        actual_digest,
        matches,
    })
}
