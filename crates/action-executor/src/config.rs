//! Executor tuning

use serde::{Deserialize, Serialize};

/// Timeouts and polling intervals used by [`ActionExecutor`](crate::ActionExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How long an element may take to become visible and stable
    pub ready_timeout_ms: u64,

    /// Interval between bounding-box samples
    pub stability_poll_ms: u64,

    /// Settle window for verification rules
    pub verify_timeout_ms: u64,

    /// Interval between verification evaluations
    pub verify_poll_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 5000,
            stability_poll_ms: 50,
            verify_timeout_ms: 1000,
            verify_poll_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ExecutorConfig = serde_json::from_str(r#"{"ready_timeout_ms": 200}"#).unwrap();
        assert_eq!(config.ready_timeout_ms, 200);
        assert_eq!(config.verify_timeout_ms, 1000);
    }
}
