//! `logpack query` command implementation
//!
//! Loads a pack and runs either ad-hoc SQL or a built-in preset against it.

use crate::commands::load_pack;
use crate::error::{CliError, Result};
use crate::output::{emit, render, OutputFormat};
use crate::{PackArgs, QuerySource};
use logpack_engine::presets::find_query;
use logpack_engine::SessionConfig;
use std::path::PathBuf;
use tracing::{debug, info};

/// Resolve the SQL a query source stands for
pub fn resolve_sql(query: &QuerySource) -> Result<String> {
    match (&query.sql, &query.preset) {
        (Some(sql), _) => Ok(sql.clone()),
        (None, Some(id)) => find_query(id)
            .map(|preset| preset.sql.trim().to_string())
            .ok_or_else(|| CliError::UnknownPreset(id.clone())),
        (None, None) => Err(CliError::config("Either --sql or --preset is required")),
    }
}

/// Run the query command
pub async fn run(
    pack: &PackArgs,
    query: &QuerySource,
    format: OutputFormat,
    output: Option<PathBuf>,
    config: SessionConfig,
) -> Result<()> {
    info!("Running query command");

    // Resolve before loading so a typo fails fast.
    let sql = resolve_sql(query)?;

    let loaded = load_pack(pack, config).await?;
    debug!(sql = %sql, "Executing query");
    let result = loaded.session()?.run_query(&sql).await;
    loaded.close().await;

    let result = result?;
    info!(rows = result.rows.len(), "Query complete");
    emit(&render(&result, format)?, output.as_deref())
}
