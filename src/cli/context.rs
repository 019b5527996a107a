use std::path::{Path, PathBuf};

use crate::config::EngineConfig;

pub struct CliContext {
    config: EngineConfig,
    config_path: PathBuf,
}

impl CliContext {
    pub fn new(config: EngineConfig, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
