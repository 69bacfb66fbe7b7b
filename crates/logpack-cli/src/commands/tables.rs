//! `logpack tables` command implementation

use crate::commands::load_pack;
use crate::error::Result;
use crate::output::format_tables;
use crate::PackArgs;
use colored::Colorize;
use logpack_engine::SessionConfig;

/// Run the tables command
pub async fn run(pack: &PackArgs, config: SessionConfig) -> Result<()> {
    let loaded = load_pack(pack, config).await?;
    let tables = loaded.session()?.list_tables().await;

    if let Some(title) = loaded.summary.manifest.as_ref().and_then(|m| m.title.as_deref()) {
        println!("{}", title.bold());
    }
    if tables.is_empty() {
        println!("{}", "No tables were loaded".yellow());
    } else {
        print!("{}", format_tables(&tables));
    }

    loaded.close().await;
    Ok(())
}
