//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// FleetHQ - instrument-control fleet supervisor
#[derive(Parser)]
#[command(
    name = "fhq",
    about = "Watch and restart a fleet of instrument-control servers",
    version,
    after_help = "Logs are written to: ~/.local/share/fleethq/logs/fleethq.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Poll the fleet and print aggregated State/Status as it changes
    Watch {
        /// Stop after this many seconds (runs until Ctrl-C if unset)
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },

    /// Select collections, then stop, clear, update and start the fleet
    Restart {
        /// Collection id to select (repeatable)
        #[arg(short = 'C', long = "collection", value_name = "ID")]
        collections: Vec<String>,
    },

    /// List configured servers with their current State and Status
    Servers,

    /// Print the effective configuration as YAML
    Config,
}

/// Location of the log file written by `fhq`
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleethq")
        .join("logs")
        .join("fleethq.log");
    debug!(?path, "get_log_path: returning path");
    path
}
