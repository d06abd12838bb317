//! CLI argument parsing for the sync daemon.

use clap::{Parser, Subcommand};

/// Docket Sync Daemon
///
/// Replays index synchronization tasks against the legacy and current
/// search backends.
#[derive(Parser, Debug)]
#[command(name = "sync-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/docket-sync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run tasks against a record snapshot
    Run {
        /// JSON file with the records tasks refer to
        #[arg(short, long)]
        snapshot: String,

        /// File with one task per line (default: stdin)
        #[arg(short, long)]
        tasks: Option<String>,

        /// Write to in-memory indices instead of the configured backends
        #[arg(long)]
        dry_run: bool,

        /// Maximum task chains running at once
        #[arg(long, default_value = "4")]
        max_concurrency: usize,
    },

    /// Print the effective configuration
    Config,
}
