use clap::Subcommand;

use super::run::RunArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run a plan against a browser
    Run(RunArgs),

    /// Parse a plan, check that every step with children can continue, and print its
    /// step tree
    Validate(ValidateArgs),

    /// Show version and effective configuration
    Info,
}
