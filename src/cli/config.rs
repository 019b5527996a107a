use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use crate::cli::context::CliContext;
use crate::config::EngineConfig;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Init { force } => {
            EngineConfig::init(path, force)
                .with_context(|| format!("Failed to initialise {}", path.display()))?;
            info!(path = %path.display(), "Configuration initialised");
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            println!("Current configuration ({}):", path.display());
            println!("{}", ctx.config().to_yaml()?);
        }
    }
    Ok(())
}
