//! Terminal result of one action execution

use action_primitives::FailureKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of [`ActionExecutor::execute`](crate::ActionExecutor::execute)
///
/// Success, skip and failure are always distinguishable: a skipped action is
/// a `Success` with `skipped = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        detail: String,
        attempts: u32,
        #[serde(default)]
        skipped: bool,
        #[serde(default)]
        fallback_used: bool,
    },
    Failure {
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl Outcome {
    pub fn success(detail: impl Into<String>, attempts: u32) -> Self {
        Outcome::Success {
            detail: detail.into(),
            attempts,
            skipped: false,
            fallback_used: false,
        }
    }

    pub fn skipped(detail: impl Into<String>, attempts: u32) -> Self {
        Outcome::Success {
            detail: detail.into(),
            attempts,
            skipped: true,
            fallback_used: false,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>, attempts: u32) -> Self {
        Outcome::Failure {
            kind,
            message: message.into(),
            attempts,
        }
    }

    pub fn cancelled(attempts: u32) -> Self {
        Self::failure(FailureKind::Cancelled, "cancelled", attempts)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Success { skipped: true, .. })
    }

    pub fn used_fallback(&self) -> bool {
        matches!(
            self,
            Outcome::Success {
                fallback_used: true,
                ..
            }
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Failure { kind, .. } => Some(*kind),
            Outcome::Success { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Cancelled)
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Success { attempts, .. } | Outcome::Failure { attempts, .. } => *attempts,
        }
    }

    /// Detail for successes, message for failures
    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { detail, .. } => detail,
            Outcome::Failure { message, .. } => message,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success {
                detail,
                skipped: true,
                ..
            } => write!(f, "skipped: {}", detail),
            Outcome::Success {
                detail,
                fallback_used: true,
                ..
            } => write!(f, "success via fallback: {}", detail),
            Outcome::Success { detail, .. } => write!(f, "success: {}", detail),
            Outcome::Failure { kind, message, .. } => write!(f, "{}: {}", kind, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_success_but_distinguishable() {
        let outcome = Outcome::skipped("no banner", 3);
        assert!(outcome.is_success());
        assert!(outcome.is_skipped());
        assert_eq!(outcome.to_string(), "skipped: no banner");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Outcome::failure(FailureKind::NotFound, "gone", 3)).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["attempts"], 3);
    }
}
