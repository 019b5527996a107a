use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_json)?;
    info!("Starting pagewright v{}", env!("CARGO_PKG_VERSION"));

    let loaded = load_config(cli.config.as_deref())?;
    let ctx = CliContext::new(loaded.config, loaded.path);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
