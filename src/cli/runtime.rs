use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::EngineConfig;

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: EngineConfig,
    pub path: PathBuf,
}

/// Explicit path, else `./config/pagewright.yaml`, else the user config dir
pub fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(EngineConfig::default_path);
    let config = EngineConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok(LoadedConfig { config, path })
}
