use super::env::CliArgs;
use super::info::cmd_info;
use super::run::cmd_run;
use super::validate::cmd_validate;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Validate(args) => cmd_validate(args, ctx).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
