// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sum_core::domain::config::PlatformConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./sum-config.yaml)
        #[arg(short, long, default_value = "./sum-config.yaml")]
        output: PathBuf,

        /// Include sites, forms and lead source rules as examples
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

fn or_unset(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "(not set)".dimmed().to_string(),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = PlatformConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SUM_CONFIG_PATH: {}",
            std::env::var("SUM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sum-config.yaml");
        println!("  4. ~/.sum/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!(
        "  Secret key: {}",
        if spec.security.secret_key.trim().is_empty() {
            "(not set)".red().to_string()
        } else {
            "(set)".to_string()
        }
    );
    println!("  Trusted proxies: {}", spec.security.trusted_proxies.len());
    println!(
        "  Storage: {}",
        if spec.database.is_some() {
            "PostgreSQL"
        } else {
            "in-memory"
        }
    );
    println!();

    println!("{}", "Notifications:".bold());
    println!("  From: {}", spec.notifications.default_from_email);
    println!(
        "  Staff email: {}",
        or_unset(spec.notifications.lead_notification_email.as_deref())
    );
    println!(
        "  Lead webhook: {}",
        or_unset(spec.notifications.lead_webhook_url.as_deref())
    );
    println!();

    println!("{}", "Sites:".bold());
    for site in &spec.sites {
        let marker = if site.is_default { " (default)" } else { "" };
        println!("  {}{}", site.hostname.bold(), marker);
        if !site.site_name.is_empty() {
            println!("    Name: {}", site.site_name);
        }
        println!(
            "    Zapier: {}",
            if site.integrations.zapier_url().is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
        for form in &site.forms {
            println!("    Form: {} → /forms/{}/submit/", form.name, form.slug);
        }
    }
    println!();

    println!("{}", "Delivery:".bold());
    println!(
        "  Retries: {} (backoff {}s, cap {}s)",
        spec.delivery.max_retries, spec.delivery.backoff_base_secs, spec.delivery.backoff_max_secs
    );
    println!(
        "  Zapier retries: {} (cap {}s)",
        spec.delivery.zapier_max_retries, spec.delivery.zapier_backoff_max_secs
    );
    println!("  Lead source rules: {}", spec.lead_source_rules.len());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PlatformConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;
    config.resolve_secret_key()?;

    for site in &config.spec.sites {
        let site_id = site.site_id()?;
        for form in &site.forms {
            let errors = form.to_definition(site_id).validate();
            if !errors.is_empty() {
                anyhow::bail!(
                    "Form '{}' on site '{}' is invalid: {:?}",
                    form.slug,
                    site.hostname,
                    errors
                );
            }
        }
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
