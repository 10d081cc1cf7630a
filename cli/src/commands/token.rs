// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Time token commands
//!
//! Issue and check anti-spam time tokens with the configured secret, for
//! testing forms and debugging rejected submissions.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sum_core::application::TimeTokenSigner;
use sum_core::domain::config::PlatformConfigManifest;
use sum_core::domain::site::DEFAULT_MIN_SECONDS_TO_SUBMIT;

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Print a fresh time token
    Issue {
        /// Backdate the token by this many seconds
        #[arg(long, default_value = "0")]
        age: i64,
    },

    /// Check a time token as a submission would
    Verify {
        #[arg(value_name = "TOKEN")]
        token: String,

        /// Minimum seconds between issue and submit
        #[arg(long, default_value_t = DEFAULT_MIN_SECONDS_TO_SUBMIT)]
        min_seconds: u64,
    },
}

pub async fn handle_command(command: TokenCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = PlatformConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let secret = config.resolve_secret_key()?;
    if secret.is_empty() {
        anyhow::bail!("spec.security.secret_key is not set");
    }
    let signer = TimeTokenSigner::new(secret);
    let now = chrono::Utc::now().timestamp();

    match command {
        TokenCommand::Issue { age } => {
            println!("{}", signer.issue_at(now - age));
        }
        TokenCommand::Verify { token, min_seconds } => match signer.check(&token, min_seconds, now) {
            Ok(()) => println!("{}", "✓ Token accepted".green()),
            Err(reason) => anyhow::bail!("Token rejected: {}", reason),
        },
    }

    Ok(())
}
