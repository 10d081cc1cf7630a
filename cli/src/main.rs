// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # SUM Platform Lead Service
//!
//! The `sum` binary serves the public form API for SUM client sites and
//! delivers captured leads to email, webhooks and Zapier.
//!
//! ## Commands
//!
//! - `sum serve` - Run the HTTP server and delivery worker
//! - `sum config show|validate|generate` - Configuration management
//! - `sum token issue|verify` - Anti-spam time tokens

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use sum_core::domain::config::PlatformConfigManifest;
use sum_platform::commands::{self, ConfigCommand, TokenCommand};
use sum_platform::server::{self, ServeOverrides};

/// SUM platform lead service
#[derive(Parser)]
#[command(name = "sum")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SUM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP port (default: from config, 8000)
    #[arg(long, global = true, env = "SUM_PORT")]
    port: Option<u16>,

    /// HTTP bind address (default: from config, 0.0.0.0)
    #[arg(long, global = true, env = "SUM_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SUM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true, env = "SUM_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the lead service
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Anti-spam time tokens
    #[command(name = "token")]
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) => {
            let config = PlatformConfigManifest::load_or_default(cli.config.clone())
                .context("Failed to load configuration")?;
            let logging = config
                .spec
                .observability
                .as_ref()
                .and_then(|o| o.logging.as_ref());
            let level = cli
                .log_level
                .as_deref()
                .or(logging.map(|l| l.level.as_str()))
                .unwrap_or("info");
            let format = cli
                .log_format
                .as_deref()
                .or(logging.map(|l| l.format.as_str()))
                .unwrap_or("text");
            init_logging(level, format)?;

            server::start_server(
                config,
                ServeOverrides {
                    host: cli.host,
                    port: cli.port,
                },
            )
            .await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Token { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::token::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).compact().init();
    }

    Ok(())
}
