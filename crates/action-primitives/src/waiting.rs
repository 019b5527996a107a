//! Readiness waiting: visible and geometrically stable

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::{sleep_or_cancel, Clock};
use crate::errors::{DriverError, FailureKind};
use crate::locator::{BoundingBox, ElementHandle, PageDriver};

/// Why the element did not become ready
#[derive(Debug, Clone, PartialEq)]
pub enum ReadinessError {
    /// Timeout expired before the element settled
    NotReady(String),

    Cancelled,

    Driver(DriverError),
}

impl ReadinessError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ReadinessError::NotReady(_) => FailureKind::NotReady,
            ReadinessError::Cancelled => FailureKind::Cancelled,
            ReadinessError::Driver(err) => err.failure_kind(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ReadinessError::NotReady(msg) => msg.clone(),
            ReadinessError::Cancelled => "cancelled while waiting for element".to_string(),
            ReadinessError::Driver(err) => err.to_string(),
        }
    }
}

/// Polls visibility and bounding box until the element settles
#[derive(Debug, Clone)]
pub struct StabilityWait {
    /// Overall readiness timeout (milliseconds)
    pub timeout_ms: u64,

    /// Interval between samples (milliseconds)
    pub poll_interval_ms: u64,

    /// Identical consecutive box samples required
    pub stable_samples: u32,
}

impl Default for StabilityWait {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            poll_interval_ms: 50,
            stable_samples: 3,
        }
    }
}

impl StabilityWait {
    pub fn new(timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            poll_interval_ms,
            ..Self::default()
        }
    }

    /// Wait until `element` is visible and its box is unchanged across
    /// `stable_samples - 1` consecutive polling intervals
    pub async fn wait(
        &self,
        driver: &dyn PageDriver,
        element: &ElementHandle,
        clock: &dyn Clock,
        cancel: &CancellationToken,
    ) -> Result<BoundingBox, ReadinessError> {
        let deadline = clock.now() + Duration::from_millis(self.timeout_ms);
        let poll = Duration::from_millis(self.poll_interval_ms.max(1));
        let required = self.stable_samples.max(1);

        let mut last: Option<BoundingBox> = None;
        let mut streak = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ReadinessError::Cancelled);
            }

            let visible = driver
                .is_visible(element)
                .await
                .map_err(ReadinessError::Driver)?;
            let bbox = if visible {
                driver
                    .bounding_box(element)
                    .await
                    .map_err(ReadinessError::Driver)?
            } else {
                None
            };

            let reason = match bbox {
                Some(current) => {
                    if last == Some(current) {
                        streak += 1;
                    } else {
                        streak = 1;
                    }
                    last = Some(current);
                    if streak >= required {
                        debug!(element = %element, samples = streak, "element is stable");
                        return Ok(current);
                    }
                    "layout still shifting"
                }
                None => {
                    streak = 0;
                    last = None;
                    if visible {
                        "element has no layout box"
                    } else {
                        "element not visible"
                    }
                }
            };

            if clock.now() >= deadline {
                warn!(element = %element, timeout_ms = self.timeout_ms, reason, "readiness timeout");
                return Err(ReadinessError::NotReady(format!(
                    "{} after {}ms",
                    reason, self.timeout_ms
                )));
            }

            sleep_or_cancel(clock, poll, cancel)
                .await
                .map_err(|_| ReadinessError::Cancelled)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stability_wait_config() {
        let wait = StabilityWait::default();
        assert_eq!(wait.timeout_ms, 5000);
        assert_eq!(wait.poll_interval_ms, 50);
        assert_eq!(wait.stable_samples, 3);
    }

    #[test]
    fn test_readiness_error_kinds() {
        assert_eq!(
            ReadinessError::NotReady("x".into()).failure_kind(),
            FailureKind::NotReady
        );
        assert_eq!(
            ReadinessError::Cancelled.failure_kind(),
            FailureKind::Cancelled
        );
    }
}
