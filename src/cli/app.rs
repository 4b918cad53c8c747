use crate::config::{ClientModel, MetadataVariant};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tufsim: metadata bandwidth simulator for package-index update schemes
#[derive(Parser)]
#[command(name = "tufsim")]
#[command(version)]
#[command(about = "Replays package-index history and measures client metadata costs")]
#[command(
    long_about = "tufsim rebuilds a package index as of a changelog window, publishes versioned TUF or Mercury metadata for every change, then replays a request log to measure how many bytes each client downloads."
)]
pub struct Cli {
    /// Configuration file (defaults to ./tufsim.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse the changelog window and print event counts
    Changelog {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Publish versioned metadata for every change in the window
    Publish {
        /// Metadata variant to publish
        #[arg(long, value_enum)]
        variant: MetadataVariant,

        /// Also write delegation role metadata
        #[arg(long)]
        delegations: bool,
    },

    /// Precompute what a client with an empty cache pays per snapshot
    Precompute {
        /// Metadata variant to read
        #[arg(long, value_enum, default_value = "tuf")]
        variant: MetadataVariant,
    },

    /// Replay the request log and write the day-bucketed cost ledger
    Simulate {
        /// Metadata variant to read
        #[arg(long, value_enum)]
        variant: MetadataVariant,

        /// What new clients already hold
        #[arg(long, value_enum)]
        model: ClientModel,

        /// Override the configured publish cadence multiplier
        #[arg(long)]
        frequency: Option<f64>,

        /// Override the configured time limit, in seconds after the window start
        #[arg(long)]
        time_limit: Option<i64>,
    },
}

impl Commands {
    /// Get the command name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Changelog { .. } => "changelog",
            Commands::Publish { .. } => "publish",
            Commands::Precompute { .. } => "precompute",
            Commands::Simulate { .. } => "simulate",
        }
    }

    /// Check if this command writes under the metadata directory
    pub fn modifies_files(&self) -> bool {
        !matches!(self, Commands::Changelog { .. })
    }
}
