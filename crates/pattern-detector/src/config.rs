use serde::{Deserialize, Serialize};

use crate::errors::DetectorError;

/// Longest repeated unit the detector looks for
pub const MAX_SEQUENCE_LEN: usize = 5;

/// Pattern detector tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Observations retained by the log and scanned by the detector
    pub window_size: usize,

    /// Shortest sequence reported
    pub min_len: usize,

    /// Longest sequence reported
    pub max_len: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 200,
            min_len: 2,
            max_len: MAX_SEQUENCE_LEN,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.min_len < 2 {
            return Err(DetectorError::InvalidConfig(
                "min_len must be at least 2".to_string(),
            ));
        }
        if self.max_len < self.min_len || self.max_len > MAX_SEQUENCE_LEN {
            return Err(DetectorError::InvalidConfig(format!(
                "max_len must be between min_len and {}",
                MAX_SEQUENCE_LEN
            )));
        }
        if self.window_size < self.min_len * 2 {
            return Err(DetectorError::InvalidConfig(format!(
                "window_size must hold two occurrences of the shortest sequence ({})",
                self.min_len * 2
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let config = DetectorConfig {
            min_len: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            max_len: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            window_size: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
