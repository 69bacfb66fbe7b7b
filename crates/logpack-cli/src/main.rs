//! LogPack CLI - Main entry point

use clap::Parser;
use logpack_cli::{commands, Cli, Commands};
use logpack_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Load .env before parsing so clap's env fallbacks see it
    let _ = dotenvy::dotenv();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Verbose mode logs debug to console; otherwise warnings only
    let base = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("logpack-cli")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_with(base.clone()).unwrap_or(base);

    // Initialize logging (ignore errors as CLI should work without logging)
    let guard = init_logging(&log_config);

    // Execute command
    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        // exit skips destructors; flush file logs first
        drop(guard);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> logpack_cli::Result<()> {
    match &cli.command {
        Commands::Query {
            pack,
            query,
            format,
            output,
        } => commands::query::run(pack, query, *format, output.clone(), cli.session_config()?).await,

        Commands::Tables { pack } => commands::tables::run(pack, cli.session_config()?).await,

        Commands::Export { pack, sql, output } => {
            commands::export::run(pack, sql, output, cli.session_config()?).await
        },

        Commands::Presets { show_sql } => commands::presets::run(*show_sql),

        Commands::Verify { file, sha256 } => commands::verify::run(file, sha256.as_deref()),

        Commands::Serve => commands::serve::run(cli.session_config()?).await,
    }
}
