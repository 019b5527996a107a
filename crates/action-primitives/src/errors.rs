//! Error types for the action model and the driver boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{ActionKind, ElementCategory};

/// Failure taxonomy shared by every layer that reports an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Target resolved to no element
    NotFound,

    /// Target resolved to several elements where one was required
    Ambiguous,

    /// Element never became visible and geometrically stable
    NotReady,

    /// The underlying interaction call failed
    DriverError,

    /// Interaction completed but its post-condition did not hold
    VerificationFailed,

    /// External cancel signal observed
    Cancelled,

    /// A loop hit its safety cap (logged, not fatal)
    LoopBoundExceeded,

    /// A workflow failed load-time validation
    SchemaInvalid,
}

impl FailureKind {
    /// Stable label used in reports and logs
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Ambiguous => "ambiguous",
            FailureKind::NotReady => "not_ready",
            FailureKind::DriverError => "driver_error",
            FailureKind::VerificationFailed => "verification_failed",
            FailureKind::Cancelled => "cancelled",
            FailureKind::LoopBoundExceeded => "loop_bound_exceeded",
            FailureKind::SchemaInvalid => "schema_invalid",
        }
    }

    /// Whether another attempt can change the result
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::NotFound
                | FailureKind::Ambiguous
                | FailureKind::NotReady
                | FailureKind::DriverError
                | FailureKind::VerificationFailed
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors raised by a [`PageDriver`](crate::PageDriver) implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Handle no longer refers to a live element
    #[error("Element detached: {0}")]
    Detached(String),

    /// Dropdown option does not exist
    #[error("Option not found: {0}")]
    OptionNotFound(String),

    /// Navigation did not complete
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The driver call itself timed out
    #[error("Driver timeout: {0}")]
    Timeout(String),

    /// Transport or protocol error
    #[error("Driver I/O error: {0}")]
    Io(String),
}

impl DriverError {
    /// Map to the failure taxonomy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DriverError::Detached(_) => FailureKind::NotFound,
            DriverError::Timeout(_) => FailureKind::NotReady,
            DriverError::OptionNotFound(_) | DriverError::Navigation(_) | DriverError::Io(_) => {
                FailureKind::DriverError
            }
        }
    }
}

/// Action model errors (invariant violations and interaction errors)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// Targeting spec is malformed
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Kind requires a target but none was given
    #[error("Action '{0}' requires a target")]
    MissingTarget(ActionKind),

    /// Kind requires a payload but none was given
    #[error("Action '{0}' requires a payload")]
    MissingPayload(ActionKind),

    /// Kind does not accept a payload
    #[error("Action '{0}' does not accept a payload")]
    UnexpectedPayload(ActionKind),

    /// Error policy values are out of range
    #[error("Invalid error policy: {0}")]
    InvalidPolicy(String),

    /// Verification rule does not fit the action
    #[error("Invalid verification rule: {0}")]
    InvalidVerify(String),

    /// Scan index outside the scanned range
    #[error("No {category} element at index {index} (scan has {len})")]
    IndexOutOfRange {
        category: ElementCategory,
        index: usize,
        len: usize,
    },

    /// Driver call failed
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ActionError {
    /// Failure kind reported when this error ends an attempt
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ActionError::Driver(err) => err.failure_kind(),
            ActionError::IndexOutOfRange { .. } => FailureKind::NotFound,
            _ => FailureKind::SchemaInvalid,
        }
    }
}

/// Raised when a cancellation token fires during a suspension point
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mapping() {
        assert_eq!(
            DriverError::Detached("x".into()).failure_kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            DriverError::Timeout("x".into()).failure_kind(),
            FailureKind::NotReady
        );
        assert_eq!(
            DriverError::Io("x".into()).failure_kind(),
            FailureKind::DriverError
        );
    }

    #[test]
    fn test_cancelled_and_loop_bound_are_not_retryable() {
        assert!(!FailureKind::Cancelled.is_retryable());
        assert!(!FailureKind::LoopBoundExceeded.is_retryable());
        assert!(FailureKind::VerificationFailed.is_retryable());
        assert!(FailureKind::Ambiguous.is_retryable());
    }
}
