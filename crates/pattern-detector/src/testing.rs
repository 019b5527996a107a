use action_executor::{AttemptOutcome, Observation};
use action_primitives::Action;
use chrono::Utc;
use pagewright_core_types::ActionId;

/// Successful first-attempt observation of `action`
pub(crate) fn observation(action: Action) -> Observation {
    Observation {
        seq: 0,
        action_id: ActionId::new(),
        action,
        resolved_identity: None,
        outcome: AttemptOutcome::Success {
            detail: "ok".to_string(),
        },
        attempt: 1,
        fallback: false,
        timestamp: Utc::now(),
    }
}
