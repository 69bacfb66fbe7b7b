//! LogPack Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads compressed log packs into an embedded DuckDB database and serves SQL
//! queries against it.
//!
//! # Overview
//!
//! A pack is a gzip-compressed tar holding a `manifest.json` and log files
//! under `logs/`. Loading one runs these stages in order:
//!
//! 1. **Download**: fetch the archive from the pack server, a file or memory
//! 2. **Verify**: compare its SHA-256 against the expected digest, if any
//! 3. **Extract**: gunzip and split the tar into entries ([`archive`])
//! 4. **Ingest**: materialize `vpc_flow_logs`, `cloudtrail_events` and the
//!    `events_unified` view ([`loader`])
//!
//! The stages run inside an [`orchestrator`] on its own thread. Callers talk
//! to it through the message types in [`protocol`], usually via a
//! [`session::Session`], which correlates query replies by id and times out
//! queries that go unanswered.
//!
//! # Example
//!
//! ```no_run
//! use logpack_engine::session::SessionManager;
//!
//! # async fn example() -> logpack_engine::Result<()> {
//! let mut manager = SessionManager::from_env()?;
//! let session = manager.open_pack("starter-vpc-cloudtrail", |_| {}).await?;
//! let summary = session.wait_ready().await?;
//! println!("{} tables", summary.tables.len());
//!
//! let result = session
//!     .run_query("SELECT srcaddr, COUNT(*) FROM vpc_flow_logs GROUP BY 1")
//!     .await?;
//! println!("{} rows", result.rows.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod archive;
pub mod cache;
pub mod config;
pub mod database;
pub mod decompression;
pub mod error;
pub mod export;
pub mod loader;
pub mod manifest;
pub mod orchestrator;
pub mod presets;
pub mod progress;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use config::SessionConfig;
pub use error::{EngineError, Result};
pub use protocol::{CallerMessage, IngestRequest, OrchestratorMessage};
pub use session::{LoadStatus, LoadSummary, Session, SessionManager};
