//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. Commands that
//! need a loaded pack go through [`load_pack`].

pub mod export;
pub mod presets;
pub mod query;
pub mod serve;
pub mod tables;
pub mod verify;

use crate::error::{CliError, Result};
use crate::progress::LoadProgress;
use crate::PackArgs;
use colored::Colorize;
use logpack_common::types::ProgressEvent;
use logpack_engine::{LoadSummary, Session, SessionConfig, SessionManager};
use std::io::{self, IsTerminal};
use tracing::{info, warn};

/// A pack loaded into a live session
pub struct LoadedPack {
    manager: SessionManager,
    pub summary: LoadSummary,
}

impl LoadedPack {
    pub fn session(&self) -> Result<&Session> {
        self.manager
            .current()
            .ok_or_else(|| CliError::config("No pack is loaded"))
    }

    /// Shut the session down
    pub async fn close(mut self) {
        self.manager.dispose_current().await;
    }
}

/// Load the pack named by `args` and wait until it is queryable
pub async fn load_pack(args: &PackArgs, config: SessionConfig) -> Result<LoadedPack> {
    let mut manager = SessionManager::new(config)?;
    let progress = if io::stderr().is_terminal() {
        LoadProgress::new()
    } else {
        LoadProgress::hidden()
    };
    let sink = progress.clone();
    let on_progress = move |event: ProgressEvent| sink.update(&event);

    let session = match (&args.source.pack, &args.source.file) {
        (Some(pack_id), _) => {
            info!(pack_id, "Loading pack from server");
            manager.open_pack(pack_id, on_progress).await?
        },
        (None, Some(path)) => {
            if !path.exists() {
                return Err(CliError::FileNotFound(path.display().to_string()));
            }
            info!(path = %path.display(), "Loading pack from file");
            manager.open_file(path.clone(), args.sha256.clone(), on_progress).await?
        },
        (None, None) => return Err(CliError::config("Either --pack or --file is required")),
    };

    let summary = match session.wait_ready().await {
        Ok(summary) => summary,
        Err(e) => {
            progress.abandon();
            return Err(e.into());
        },
    };
    progress.finish();

    for issue in &summary.issues {
        warn!(step = ?issue.step, subject = %issue.subject, "Load issue: {}", issue.message);
        eprintln!(
            "{} {} ({}): {}",
            "⚠".yellow(),
            issue.subject,
            format!("{:?}", issue.step).dimmed(),
            issue.message
        );
    }

    Ok(LoadedPack { manager, summary })
}
