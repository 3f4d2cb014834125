//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand, ValueEnum};
use mend_common::report::SortKey;
use std::path::PathBuf;

/// Mend fault knowledge CLI
#[derive(Parser, Debug)]
#[command(name = "mendctl")]
#[command(about = "Inspect recorded faults and remediation strategies", long_about = None)]
#[command(version = env!("MEND_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Path to a TOML config file (overrides $MEND_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output JSON only
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List recorded faults
    Recent {
        #[arg(long, value_enum, default_value_t = SortArg::Occurrences)]
        sort: SortArg,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Faults that recur often or whose fixes keep failing
    Critical {
        /// Occurrence threshold (defaults to the configured one)
        #[arg(long)]
        threshold: Option<u64>,
    },

    /// Health score per operation
    Health,

    /// Faults with no remediation strategy
    Unfixed,

    /// Remediation strategies for one fault id
    Strategies { fault_id: String },

    /// Write the full report as JSON
    Export { path: PathBuf },

    /// Totals, critical ids and faults per operation
    Summary,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortArg {
    Occurrences,
    Severity,
    Fixes,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Occurrences => SortKey::Occurrences,
            SortArg::Severity => SortKey::Severity,
            SortArg::Fixes => SortKey::Fixes,
        }
    }
}
