//! Docket Sync Daemon
//!
//! Replays index synchronization tasks against a record snapshot.
//!
//! # Usage
//!
//! ```bash
//! sync-daemon run --snapshot records.json [--tasks tasks.jsonl] [--dry-run]
//! sync-daemon config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/docket-sync/config.toml)
//! 3. Environment variables (SYNC_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use sync_daemon::{run_tasks, show_config, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            snapshot,
            tasks,
            dry_run,
            max_concurrency,
        } => {
            run_tasks(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                &snapshot,
                tasks.as_deref(),
                dry_run,
                max_concurrency,
            )
            .await?;
        }
        Commands::Config => {
            show_config(cli.config.as_deref(), cli.log_level.as_deref())?;
        }
    }

    Ok(())
}
