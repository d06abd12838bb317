//! Sync daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{execute, load_settings, render_config, run_tasks, show_config, RunReport};
