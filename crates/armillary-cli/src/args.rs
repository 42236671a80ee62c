//! Command-line argument definitions for the Armillary CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Arguments control the session script, the report
//! destination, configuration file selection, and logging verbosity.

use clap::Parser;

/// Command-line arguments for the Armillary session runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the session script
    #[arg(help = "Path to the TOML session script")]
    pub input: String,

    /// Path to write the final element tree to; printed to stdout if omitted
    #[arg(short, long)]
    pub output: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Stop at the first step whose preconditions fail instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
