//! Mend Control - reporting CLI over the fault knowledge store

use anyhow::Result;
use clap::Parser;
use mend_common::{logging, MendConfig};
use mendctl::cli::Cli;
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MendConfig::load(cli.config.as_deref())?;

    logging::init(&config.log_filter);
    debug!(version = mendctl::VERSION, data_dir = %config.data_dir.display(), "mendctl starting");

    mendctl::run(cli, config)
}
