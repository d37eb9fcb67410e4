//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod harvest;
mod helpers;
mod init;
mod report;
mod targets;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "bidharvest")]
#[command(about = "Procurement notice harvester for municipal portals")]
#[command(version)]
pub struct Cli {
    /// Data directory or database file (overrides config file).
    /// Can be a directory containing bidharvest.db or a .db file directly.
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Harvest every catalog target matching an optional predicate
    Run {
        /// SQL predicate over the targets table (without WHERE), e.g. "region = sp"
        #[arg(long = "where", value_name = "PREDICATE")]
        filter: Option<String>,
        /// Number of concurrent workers (default: from config, else min(max(4, cpus/2), 16))
        #[arg(short, long)]
        workers: Option<usize>,
        /// Show the browser windows
        #[arg(long)]
        headed: bool,
        /// Drill into every record, not only those still open
        #[arg(short, long)]
        force: bool,
        /// Session label (default: derived from the predicate)
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Manage the target catalog
    Targets {
        #[command(subcommand)]
        command: TargetCommands,
    },

    /// Show the latest update date and per-target counts for that day
    LastUpdate {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show thirty-day harvest statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// List catalog targets
    List,
    /// Add or replace a catalog target
    Add {
        /// Target ID
        id: String,
        /// Display name
        name: String,
        /// Portal base address, e.g. https://compras.example.gov.br
        base_address: String,
        /// Two-letter region code
        #[arg(long)]
        region: Option<String>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Run {
            filter,
            workers,
            headed,
            force,
            label,
        } => {
            harvest::cmd_run(
                &settings,
                harvest::RunArgs {
                    filter,
                    workers,
                    headed,
                    force,
                    label,
                },
            )
            .await
        }
        Commands::Targets { command } => match command {
            TargetCommands::List => targets::cmd_targets_list(&settings).await,
            TargetCommands::Add {
                id,
                name,
                base_address,
                region,
            } => {
                targets::cmd_targets_add(&settings, &id, &name, &base_address, region.as_deref())
                    .await
            }
        },
        Commands::LastUpdate { json } => report::cmd_last_update(&settings, json).await,
        Commands::Stats { json } => report::cmd_stats(&settings, json).await,
    }
}
