//! Rendering of query results and table listings

use crate::error::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use logpack_common::types::{QueryResult, TableSummary};
use logpack_engine::export::{to_csv, value_to_string};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Table cell for a value; nulls are spelled out
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(v) => value_to_string(v),
    }
}

/// Format results as table
pub fn format_as_table(result: &QueryResult) -> String {
    let mut table = new_table();
    table.set_header(result.column_names());

    for row in &result.rows {
        table.add_row(result.column_names().map(|name| cell(row.get(name))));
    }

    format!("{}\n", table)
}

/// Format results as a JSON array of row objects
pub fn format_as_json(result: &QueryResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&result.rows)?)
}

pub fn render(result: &QueryResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => format_as_table(result),
        OutputFormat::Json => format_as_json(result)? + "\n",
        OutputFormat::Csv => to_csv(result) + "\n",
    })
}

/// Format a table listing
pub fn format_tables(tables: &[TableSummary]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Table", "Source", "Rows"]);
    for summary in tables {
        table.add_row(vec![
            summary.name.clone(),
            summary.source.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            summary.row_count.to_string(),
        ]);
    }
    format!("{}\n", table)
}

/// Write to `output` if given, stdout otherwise
pub fn emit(formatted: &str, output: Option<&Path>) -> Result<()> {
    if let Some(file_path) = output {
        std::fs::write(file_path, formatted)?;
        eprintln!(
            "{} Output written to: {}",
            "✓".green(),
            file_path.display().to_string().cyan()
        );
    } else {
        print!("{}", formatted);
    }
    Ok(())
}
