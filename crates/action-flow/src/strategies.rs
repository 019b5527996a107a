//! Failure handling after the executor has applied its own policy

use action_executor::Outcome;
use action_primitives::{Exhaustion, FailureKind};
use tracing::{info, warn};

use crate::types::{AbortReason, StepStatus};

/// Result of failure handling
#[derive(Debug, Clone, PartialEq)]
pub enum FailureHandlerResult {
    /// Record the step and move on
    Continue {
        status: StepStatus,
        reason: Option<String>,
    },

    /// Stop the entire replay
    Abort {
        status: StepStatus,
        reason: AbortReason,
        message: String,
    },
}

/// Decides how the replay proceeds after an action step
pub trait FailureHandler: Send + Sync {
    fn handle_outcome(
        &self,
        step_id: &str,
        outcome: &Outcome,
        on_exhaustion: Exhaustion,
    ) -> FailureHandlerResult;
}

/// Default failure handler implementation
///
/// Cancellation always aborts. A surfaced failure aborts only when the
/// step's policy is `abort`; a failed or missing fallback continues.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFailureHandler;

impl DefaultFailureHandler {
    /// Create a new default failure handler
    pub fn new() -> Self {
        Self
    }
}

impl FailureHandler for DefaultFailureHandler {
    fn handle_outcome(
        &self,
        step_id: &str,
        outcome: &Outcome,
        on_exhaustion: Exhaustion,
    ) -> FailureHandlerResult {
        match outcome {
            Outcome::Success { skipped: true, detail, .. } => {
                info!(step_id, "Step skipped: {}", detail);
                FailureHandlerResult::Continue {
                    status: StepStatus::Skipped,
                    reason: Some(detail.clone()),
                }
            }
            Outcome::Success {
                fallback_used: true,
                detail,
                ..
            } => {
                info!(step_id, "Step completed via fallback");
                FailureHandlerResult::Continue {
                    status: StepStatus::FallbackUsed,
                    reason: Some(detail.clone()),
                }
            }
            Outcome::Success { .. } => FailureHandlerResult::Continue {
                status: StepStatus::Success,
                reason: None,
            },
            Outcome::Failure {
                kind: FailureKind::Cancelled,
                ..
            } => {
                info!(step_id, "Step cancelled, aborting replay");
                FailureHandlerResult::Abort {
                    status: StepStatus::Cancelled,
                    reason: AbortReason::Cancelled,
                    message: "cancelled".to_string(),
                }
            }
            Outcome::Failure { kind, message, .. } => match on_exhaustion {
                Exhaustion::Abort => {
                    warn!(step_id, kind = %kind, "Step failed, aborting replay: {}", message);
                    FailureHandlerResult::Abort {
                        status: StepStatus::Failed,
                        reason: AbortReason::StepFailed {
                            step_id: step_id.to_string(),
                            kind: *kind,
                        },
                        message: format!("{}: {}", kind, message),
                    }
                }
                Exhaustion::Skip | Exhaustion::Fallback => {
                    warn!(step_id, kind = %kind, "Step failed, continuing: {}", message);
                    FailureHandlerResult::Continue {
                        status: StepStatus::Failed,
                        reason: Some(format!("{}: {}", kind, message)),
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_policy_aborts() {
        let handler = DefaultFailureHandler::new();
        let outcome = Outcome::failure(FailureKind::NotFound, "no element", 3);
        let result = handler.handle_outcome("s1", &outcome, Exhaustion::Abort);
        assert!(matches!(
            result,
            FailureHandlerResult::Abort {
                status: StepStatus::Failed,
                reason: AbortReason::StepFailed { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_failed_fallback_continues() {
        let handler = DefaultFailureHandler::new();
        let outcome = Outcome::failure(FailureKind::NotFound, "fallback failed: gone", 2);
        let result = handler.handle_outcome("s1", &outcome, Exhaustion::Fallback);
        assert!(matches!(
            result,
            FailureHandlerResult::Continue {
                status: StepStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn test_cancel_aborts_regardless_of_policy() {
        let handler = DefaultFailureHandler::new();
        let result = handler.handle_outcome("s1", &Outcome::cancelled(1), Exhaustion::Skip);
        assert!(matches!(
            result,
            FailureHandlerResult::Abort {
                reason: AbortReason::Cancelled,
                ..
            }
        ));
    }
}
