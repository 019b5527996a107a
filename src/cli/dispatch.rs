use anyhow::Result;

use super::commands::Commands;
use super::config::cmd_config;
use super::context::CliContext;
use super::detect::cmd_detect;
use super::env::CliArgs;
use super::workflow::cmd_workflow;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Workflow(args) => cmd_workflow(args, ctx).await,
        Commands::Detect(args) => cmd_detect(args, ctx).await,
    }
}
