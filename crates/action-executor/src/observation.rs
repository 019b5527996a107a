//! Per-attempt observation records

use action_primitives::{Action, ElementIdentity, FailureKind};
use chrono::{DateTime, Utc};
use pagewright_core_types::ActionId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { detail: String },
    Failure { kind: FailureKind, message: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

/// One executed attempt, with the payload that was actually sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Position in the log; assigned on append
    #[serde(default)]
    pub seq: u64,

    /// Shared by every attempt of one execution
    pub action_id: ActionId,

    /// Concrete action (no placeholders, normalised URL)
    pub action: Action,

    /// Role and stable attribute of the element the target resolved to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_identity: Option<ElementIdentity>,

    pub outcome: AttemptOutcome,

    /// 1-based attempt number
    pub attempt: u32,

    /// Attempt made with the caller-supplied fallback action
    #[serde(default)]
    pub fallback: bool,

    pub timestamp: DateTime<Utc>,
}

/// Receives every attempt the executor makes
pub trait ObservationSink: Send + Sync {
    fn record(&self, observation: Observation);
}

/// Sink keeping everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Observation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Observation> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ObservationSink for MemorySink {
    fn record(&self, mut observation: Observation) {
        let mut entries = self.entries.lock();
        observation.seq = entries.len() as u64 + 1;
        entries.push(observation);
    }
}
