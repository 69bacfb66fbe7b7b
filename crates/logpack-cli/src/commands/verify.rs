//! `logpack verify` command implementation
//!
//! Digests a local archive the same way the engine does before extraction.

use crate::error::{CliError, Result};
use crate::progress::{create_spinner, format_bytes};
use colored::Colorize;
use logpack_common::checksum::{compute_file_checksum, normalize_digest};
use logpack_common::PackError;
use std::path::Path;
use tracing::info;

/// Digest `file` and compare it with `expected` when given
pub fn check(file: &Path, expected: Option<&str>) -> Result<String> {
    if !file.exists() {
        return Err(CliError::FileNotFound(file.display().to_string()));
    }
    let actual = compute_file_checksum(file)?;

    if let Some(expected) = expected {
        let expected = normalize_digest(expected)?;
        if expected != actual {
            return Err(PackError::ChecksumMismatch { expected, actual }.into());
        }
    }
    Ok(actual)
}

/// Run the verify command
pub fn run(file: &Path, expected: Option<&str>) -> Result<()> {
    let spinner = create_spinner(&format!("Hashing {}", file.display()));
    let result = check(file, expected);
    spinner.finish_and_clear();

    let digest = result?;
    let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
    info!(path = %file.display(), digest = %digest, verified = expected.is_some(), "Digest computed");

    if expected.is_some() {
        println!("{} SHA-256 OK ({})", "✓".green(), format_bytes(size));
    }
    println!("{}  {}", digest, file.display());
    Ok(())
}
