//! Mendctl library - exposes modules for testing

pub mod cli;
pub mod commands;
pub mod display;

use anyhow::Result;
use mend_common::MendConfig;

use cli::{Cli, Commands};
use commands::Workspace;

// Version is embedded at build time
pub const VERSION: &str = env!("MEND_VERSION");

/// Execute a parsed command line against an already loaded config.
pub fn run(cli: Cli, config: MendConfig) -> Result<()> {
    let ws = Workspace::open(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Recent { sort, limit } => commands::recent(&ws, sort.into(), limit, json),
        Commands::Critical { threshold } => commands::critical(&ws, threshold, json),
        Commands::Health => commands::health(&ws, json),
        Commands::Unfixed => commands::unfixed(&ws, json),
        Commands::Strategies { fault_id } => commands::strategies(&ws, &fault_id, json),
        Commands::Export { path } => commands::export(&ws, &path, json),
        Commands::Summary => commands::summary(&ws, json),
    }
}
