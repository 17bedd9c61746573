//! intake CLI - Main entry point

use clap::Parser;
use intake_cli::{commands, Cli, Commands};
use intake_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The sink is a long-running receiver, so it logs at info by default.
    let level = match (&cli.command, cli.verbose) {
        (_, true) => LogLevel::Debug,
        (Commands::Sink { .. }, false) => LogLevel::Info,
        (_, false) => LogLevel::Warn,
    };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("intake-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    let code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            1
        },
    };
    process::exit(code);
}

/// Run the command and return the process exit code
async fn execute_command(cli: &Cli) -> intake_cli::Result<i32> {
    match &cli.command {
        Commands::Sink { host, port } => {
            commands::sink::run(host, *port).await?;
            Ok(0)
        },
        Commands::Upload { url, fields, files } => {
            let outcome = commands::upload::run(url, fields, files).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.body).unwrap_or_else(|_| outcome.body.to_string())
            );
            Ok(if outcome.is_success() { 0 } else { 1 })
        },
    }
}
