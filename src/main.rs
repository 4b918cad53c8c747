//! tufsim - package-index metadata bandwidth simulator

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tufsim::cli::commands::{
    changelog::ChangelogCommand, precompute::PrecomputeCommand, publish::PublishCommand,
    simulate::SimulateCommand, CommandHandler,
};
use tufsim::cli::{Cli, Commands, LogLevel};
use tufsim::config::ConfigLoader;

/// Initialize tracing from the CLI flags; `RUST_LOG` directives are layered on top
fn initialize_tracing(log_level: LogLevel, json: bool) {
    let mut filter = EnvFilter::new(log_level.to_filter_directive());
    if let Ok(directives) = std::env::var("RUST_LOG") {
        for directive in directives.split(',').filter(|d| !d.is_empty()) {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
    }

    // Logs go to stderr; stdout carries command output
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.log_level, cli.log_json);

    let loader = ConfigLoader::new();
    let config = match &cli.config {
        Some(path) => loader
            .with_strict_validation()
            .load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => loader
            .load_default()
            .context("Failed to load default configuration")?,
    };
    debug!(?config, "configuration loaded");

    let handler: Box<dyn CommandHandler> = match cli.command {
        Commands::Changelog { format } => Box::new(ChangelogCommand::new(format)),
        Commands::Publish {
            variant,
            delegations,
        } => Box::new(PublishCommand::new(variant, delegations)),
        Commands::Precompute { variant } => Box::new(PrecomputeCommand::new(variant)),
        Commands::Simulate {
            variant,
            model,
            frequency,
            time_limit,
        } => Box::new(SimulateCommand::new(variant, model, frequency, time_limit)),
    };

    info!(command = handler.name(), "starting");
    handler
        .execute(&config)
        .with_context(|| format!("{} failed", handler.name()))?;
    Ok(())
}
