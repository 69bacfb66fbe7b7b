//! `logpack presets` command implementation

use crate::error::Result;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use logpack_engine::presets::{starter_packs, QueryPack};

fn format_pack(pack: &QueryPack) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Id", "Title", "Category", "Columns"]);

    for query in &pack.queries {
        let columns = query
            .output
            .as_ref()
            .map(|shape| {
                shape
                    .columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        table.add_row(vec![
            query.id.clone(),
            query.title.clone(),
            query.category.map(|c| c.to_string()).unwrap_or_default(),
            columns,
        ]);
    }

    format!("{}\n", table)
}

/// Run the presets command
pub fn run(show_sql: bool) -> Result<()> {
    for pack in starter_packs() {
        println!("{} {}", pack.title.bold(), format!("({})", pack.id).dimmed());
        print!("{}", format_pack(&pack));

        if show_sql {
            for query in &pack.queries {
                println!("{}", format!("-- {}", query.id).green());
                println!("{}", query.sql.trim());
                println!();
            }
        }
    }
    Ok(())
}
