//! Versioned engine configuration
//!
//! Loaded once by the host and passed by value to each component; nothing
//! in the engine reads ambient state.

use std::fs;
use std::path::{Path, PathBuf};

use action_executor::ExecutorConfig;
use action_flow::ReplayConfig;
use pattern_detector::DetectorConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ConfigError;

/// Version written by this build
pub const CONFIG_VERSION: u32 = 1;

const LOCAL_CONFIG: &str = "config/pagewright.yaml";

/// Which browser profile the host driver should open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserProfile {
    /// Reuse the user's existing profile
    #[default]
    Existing,
    /// Start from a clean profile
    Fresh,
}

/// Host preferences carried between sessions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPreferences {
    pub profile: BrowserProfile,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: u32,
    pub executor: ExecutorConfig,
    pub detector: DetectorConfig,
    pub replay: ReplayConfig,
    pub session: SessionPreferences,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            executor: ExecutorConfig::default(),
            detector: DetectorConfig::default(),
            replay: ReplayConfig::default(),
            session: SessionPreferences::default(),
        }
    }
}

impl EngineConfig {
    /// Read `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = Self::from_yaml(&content).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        info!(path = %path.display(), version = config.version, "Loaded configuration");
        Ok(config)
    }

    /// Write defaults to `path`; an existing file is kept unless `force`
    pub fn init(path: &Path, force: bool) -> Result<Self, ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let config = Self::default();
        config.persist(path)?;
        Ok(config)
    }

    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
        fs::write(path, self.to_yaml()?).map_err(|e| ConfigError::io(path, e))?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: CONFIG_VERSION,
            });
        }
        self.detector
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.replay.default_max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "replay.default_max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `./config/pagewright.yaml` when present, else the user config dir
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return local;
        }
        match dirs::config_dir() {
            Some(mut path) => {
                path.push("pagewright");
                path.push("config.yaml");
                path
            }
            None => local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_fills_defaults() {
        let config = EngineConfig::from_yaml(
            r#"
version: 1
executor:
  ready_timeout_ms: 800
session:
  profile: fresh
"#,
        )
        .unwrap();
        assert_eq!(config.executor.ready_timeout_ms, 800);
        assert_eq!(config.executor.verify_timeout_ms, 1000);
        assert_eq!(config.session.profile, BrowserProfile::Fresh);
        assert_eq!(config.detector, DetectorConfig::default());
    }

    #[test]
    fn test_future_version_rejected() {
        let err = EngineConfig::from_yaml("version: 2\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedVersion {
                found: 2,
                supported: 1
            }
        ));
    }

    #[test]
    fn test_invalid_detector_section_rejected() {
        let err = EngineConfig::from_yaml("detector:\n  max_len: 9\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
