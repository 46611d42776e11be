//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Gatekeeper - cache, locks and flash-sale admission control
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "GATEKEEPER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "GATEKEEPER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "GATEKEEPER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to run)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the sweeper and periodic health probe until interrupted (default)
    Run,

    /// Run one health probe and print any faults as JSON
    Probe,

    /// Simulate concurrent flash-sale demand against a fresh inventory
    Simulate {
        /// Item identifier
        #[arg(long, default_value = "demo-item")]
        item: String,

        /// Total inventory
        #[arg(long, default_value_t = 100)]
        total: i64,

        /// Per-acquisition limit
        #[arg(long, default_value_t = 10)]
        limit: i64,

        /// Number of concurrent buyers
        #[arg(long, default_value_t = 32)]
        workers: usize,

        /// Units each buyer requests
        #[arg(long, default_value_t = 7)]
        request: i64,
    },

    /// Validate the configuration and print the effective values
    CheckConfig,
}
