// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # deployd
//!
//! Service binary for tenant workload orchestration.
//!
//! ## Commands
//!
//! - `deployd serve` - Run the HTTP API
//! - `deployd config show|validate|generate` - Configuration management
//! - `deployd migrate [--dry-run]` - Apply PostgreSQL schema migrations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use deployd::commands::{self, ConfigCommand, MigrateCommand, ServeArgs};
use deployd_core::domain::service_config::{LogFormat, ServiceConfigManifest};

/// deployd - Provision and manage tenant workloads on a shared cluster
#[derive(Parser)]
#[command(name = "deployd")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to spec.logging.level
    #[arg(long, global = true, env = "DEPLOYD_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply database migrations
    #[command(name = "migrate")]
    Migrate(MigrateCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = ServiceConfigManifest::load_or_default(cli.config.clone())
                .context("Failed to load configuration")?;
            let level = cli.log_level.as_deref().unwrap_or(&config.spec.logging.level);
            init_logging(level, config.spec.logging.format)?;
            info!(version = env!("CARGO_PKG_VERSION"), "Starting deployd");
            commands::serve::execute(args, config).await
        }
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::config::handle_command(command, cli.config).await
        }
        Commands::Migrate(command) => {
            let config = ServiceConfigManifest::load_or_default(cli.config.clone())
                .context("Failed to load configuration")?;
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::migrate::execute(command, &config).await
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.with_target(false).compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
