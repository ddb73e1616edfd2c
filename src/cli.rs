//! Command-line interface definitions.
//!
//! All runtime behavior lives in the YAML config; the CLI only says where
//! that file is and optionally overrides the run mode.

use crate::config::Mode;
use clap::Parser;

/// Command-line arguments for medipost.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml", env = "MEDIPOST_CONFIG")]
    pub config: String,

    /// Override the run mode from the config file
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,
}
