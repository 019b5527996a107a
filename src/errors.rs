//! Errors surfaced by the engine facade and its configuration

use std::path::PathBuf;

use action_flow::FlowError;
use pattern_detector::DetectorError;
use thiserror::Error;

/// Configuration lifecycle failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("{0} already exists (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the automation session facade
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}
