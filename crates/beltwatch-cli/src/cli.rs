//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Client for Beltwatch belt-stop sensors", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides the configuration)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

/// Which sensor to connect to; falls back to the configured device
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Device address or platform id
    #[arg(short, long, conflicts_with = "name")]
    pub address: Option<String>,

    /// Advertised name prefix
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List nearby sensors
    Scan {
        /// Scan duration in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Connect and stay attached, reading commands from stdin
    Run {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Connect, download the sensor's backlog and exit once acknowledged
    Sync {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Export stored stops as CSV
    #[command(group(ArgGroup::new("range").required(true).args(["day", "month", "all"])))]
    Export {
        /// One local day, YYYY-MM-DD
        #[arg(long)]
        day: Option<String>,

        /// One local month, YYYY-MM
        #[arg(long)]
        month: Option<String>,

        /// Everything stored
        #[arg(long)]
        all: bool,

        /// UTC offset in minutes for dates and times (defaults to the configuration)
        #[arg(long, allow_hyphen_values = true)]
        tz_offset: Option<i32>,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Print an example configuration file instead
        #[arg(long)]
        example: bool,
    },
}
