//! Gate input and result types

use action_primitives::TargetSpec;
use serde::{Deserialize, Serialize};

/// What the rule is evaluated against
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Target re-resolved by the rule
    pub target: Option<TargetSpec>,

    /// Payload after placeholder substitution
    pub payload: Option<String>,
}

impl ValidationContext {
    pub fn new(target: Option<TargetSpec>, payload: Option<String>) -> Self {
        Self { target, payload }
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Whether validation passed
    pub passed: bool,

    /// Reasons for pass/fail
    pub reasons: Vec<String>,

    /// Number of evaluations performed
    pub evaluations: u32,

    /// Validation latency in milliseconds
    pub latency_ms: u64,
}

impl GateResult {
    /// Create a passing result
    pub fn pass(reasons: Vec<String>) -> Self {
        Self {
            passed: true,
            reasons,
            evaluations: 0,
            latency_ms: 0,
        }
    }

    /// Create a failing result
    pub fn fail(reasons: Vec<String>) -> Self {
        Self {
            passed: false,
            reasons,
            evaluations: 0,
            latency_ms: 0,
        }
    }

    pub fn with_evaluations(mut self, evaluations: u32) -> Self {
        self.evaluations = evaluations;
        self
    }

    /// Set latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Reasons joined for reports
    pub fn summary(&self) -> String {
        self.reasons.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_result_builders() {
        let result = GateResult::fail(vec!["a".into(), "b".into()])
            .with_evaluations(3)
            .with_latency(120);
        assert!(!result.passed);
        assert_eq!(result.evaluations, 3);
        assert_eq!(result.summary(), "a; b");
    }
}
