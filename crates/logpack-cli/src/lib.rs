//! LogPack CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command-line interface for loading log packs and querying them with SQL.
//!
//! # Overview
//!
//! - **Querying**: Run ad-hoc SQL or a preset against a pack (`logpack query`)
//! - **Inspection**: List the tables a pack produced (`logpack tables`)
//! - **Export**: Write a query result to CSV (`logpack export`)
//! - **Presets**: Browse the built-in query packs (`logpack presets`)
//! - **Integrity**: Check an archive's SHA-256 (`logpack verify`)
//! - **Embedding**: Speak the orchestrator protocol over stdio (`logpack serve`)

pub mod commands;
pub mod error;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};
pub use output::OutputFormat;

use clap::{Args, Parser, Subcommand};
use logpack_engine::SessionConfig;
use std::path::PathBuf;
use std::time::Duration;

/// LogPack - load security log packs and query them with SQL
#[derive(Parser, Debug)]
#[command(name = "logpack")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pack server URL
    #[arg(long, env = "LOGPACK_SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// Query timeout in seconds
    #[arg(long, env = "LOGPACK_QUERY_TIMEOUT_SECS", global = true)]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Session configuration from the environment with command-line overrides
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = SessionConfig::from_env()?;
        if let Some(ref url) = self.server_url {
            config = config.with_server_url(url.clone());
        }
        if let Some(secs) = self.timeout {
            if secs == 0 {
                return Err(CliError::config("--timeout must be at least 1 second"));
            }
            config = config.with_query_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

/// Where to load a pack from
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct PackSource {
    /// Pack id on the pack server
    #[arg(long)]
    pub pack: Option<String>,

    /// Local .tar.gz archive
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Pack source plus the digest to check a local archive against
#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    #[command(flatten)]
    pub source: PackSource,

    /// Expected SHA-256 of the local archive
    #[arg(long, requires = "file")]
    pub sha256: Option<String>,
}

/// What a query runs
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct QuerySource {
    /// SQL to run
    #[arg(long)]
    pub sql: Option<String>,

    /// Id of a built-in query (see `logpack presets`)
    #[arg(long)]
    pub preset: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a pack and run a query against it
    Query {
        #[command(flatten)]
        pack: PackArgs,

        #[command(flatten)]
        query: QuerySource,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a pack and list its tables with row counts
    Tables {
        #[command(flatten)]
        pack: PackArgs,
    },

    /// Load a pack and export a query result as CSV
    Export {
        #[command(flatten)]
        pack: PackArgs,

        /// SQL to run
        #[arg(long)]
        sql: String,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the built-in query presets
    Presets {
        /// Include each preset's SQL
        #[arg(long)]
        show_sql: bool,
    },

    /// Compute an archive's SHA-256, optionally checking it
    Verify {
        /// Archive to digest
        #[arg(long)]
        file: PathBuf,

        /// Expected SHA-256
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Serve the orchestrator protocol as JSON lines over stdin/stdout
    Serve,
}
