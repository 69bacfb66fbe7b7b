//! LogPack Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the LogPack workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all LogPack workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: SHA-256 integrity verification of downloaded packs
//! - **Logging**: Centralized `tracing` subscriber setup
//! - **Types**: Progress events, table summaries and query results
//!
//! # Example
//!
//! ```no_run
//! use logpack_common::checksum::verify_digest;
//! use logpack_common::Result;
//!
//! fn check(bytes: &[u8], expected: Option<&str>) -> Result<()> {
//!     let result = verify_digest(bytes, expected)?;
//!     result.into_result()?;
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PackError, Result};
