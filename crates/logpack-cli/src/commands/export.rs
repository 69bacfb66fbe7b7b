//! `logpack export` command implementation

use crate::commands::load_pack;
use crate::error::Result;
use crate::PackArgs;
use colored::Colorize;
use logpack_engine::SessionConfig;
use std::path::Path;
use tracing::info;

/// Run the export command
pub async fn run(pack: &PackArgs, sql: &str, output: &Path, config: SessionConfig) -> Result<()> {
    let loaded = load_pack(pack, config).await?;
    let csv = loaded.session()?.export_csv(sql).await;
    loaded.close().await;

    let mut csv = csv?;
    csv.push('\n');
    std::fs::write(output, &csv)?;
    info!(path = %output.display(), bytes = csv.len(), "Exported CSV");

    println!(
        "{} Exported to: {}",
        "✓".green(),
        output.display().to_string().cyan()
    );
    Ok(())
}
