use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

/// Run declarative browser step plans and record their result trees.
#[derive(Parser)]
#[command(name = "tabflow", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Settings file with browser, timeout and race options. Without it, tabflow
    /// reads ./config/config.yaml, then <config dir>/tabflow/config.yaml.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter written to stderr (error, warn, info, debug, trace); RUST_LOG wins
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Shorthand for --log-level debug, which also logs every step and race attempt
    #[arg(short, long)]
    pub debug: bool,

    /// How plan outlines, result trees and info are printed on stdout
    #[arg(short, long, value_enum, value_name = "FORMAT", default_value = "human")]
    pub output: crate::cli::output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
