//! Gate validator with a settle window

use action_primitives::{sleep_or_cancel, Clock, PageDriver, VerifyRule};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{conditions::evaluate_rule, errors::GateError, types::*};

/// Gate validator trait
#[async_trait]
pub trait GateValidator: Send + Sync {
    /// Evaluate `rule` until it holds or the settle window closes
    async fn validate(
        &self,
        rule: &VerifyRule,
        context: &ValidationContext,
        driver: &dyn PageDriver,
        clock: &dyn Clock,
        cancel: &CancellationToken,
    ) -> Result<GateResult, GateError>;
}

/// Default gate validator implementation
#[derive(Debug, Clone)]
pub struct DefaultGateValidator {
    /// Settle window (milliseconds)
    pub timeout_ms: u64,

    /// Interval between evaluations (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for DefaultGateValidator {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            poll_interval_ms: 50,
        }
    }
}

impl DefaultGateValidator {
    /// Create a new gate validator
    pub fn new(timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            poll_interval_ms,
        }
    }
}

#[async_trait]
impl GateValidator for DefaultGateValidator {
    async fn validate(
        &self,
        rule: &VerifyRule,
        context: &ValidationContext,
        driver: &dyn PageDriver,
        clock: &dyn Clock,
        cancel: &CancellationToken,
    ) -> Result<GateResult, GateError> {
        let start = clock.now();
        let deadline = start + Duration::from_millis(self.timeout_ms);
        let poll = Duration::from_millis(self.poll_interval_ms.max(1));
        let mut evaluations = 0u32;

        debug!(rule = rule.name(), timeout_ms = self.timeout_ms, "starting gate validation");

        loop {
            if cancel.is_cancelled() {
                return Err(GateError::Cancelled);
            }

            let check = evaluate_rule(driver, rule, context).await?;
            evaluations += 1;
            let latency_ms = (clock.now() - start).as_millis() as u64;

            if check.holds {
                info!(rule = rule.name(), evaluations, "verification passed: {}", check.reason);
                return Ok(GateResult::pass(vec![check.reason])
                    .with_evaluations(evaluations)
                    .with_latency(latency_ms));
            }

            if clock.now() >= deadline {
                warn!(rule = rule.name(), evaluations, "verification failed: {}", check.reason);
                return Ok(GateResult::fail(vec![
                    format!("{} did not hold within {}ms", rule.name(), self.timeout_ms),
                    check.reason,
                ])
                .with_evaluations(evaluations)
                .with_latency(latency_ms));
            }

            sleep_or_cancel(clock, poll, cancel)
                .await
                .map_err(|_| GateError::Cancelled)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::stub::{StubElement, StubPage};
    use action_primitives::{ManualClock, TargetSpec};

    #[tokio::test]
    async fn test_rule_passing_immediately_evaluates_once() {
        let page = StubPage::with_elements([StubElement::button("go", "Go")]);
        let clock = ManualClock::new();
        let ctx = ValidationContext::new(Some(TargetSpec::text("Go")), None);

        let result = DefaultGateValidator::default()
            .validate(&VerifyRule::ElementPresent, &ctx, &page, &clock, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.evaluations, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_rule_failing_until_timeout() {
        let page = StubPage::with_elements([StubElement::button("go", "Go")]);
        let clock = ManualClock::new();
        let ctx = ValidationContext::new(Some(TargetSpec::text("Go")), None);

        let result = DefaultGateValidator::new(200, 50)
            .validate(&VerifyRule::ElementAbsent, &ctx, &page, &clock, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.evaluations, 5);
        assert!(result.summary().contains("element_absent did not hold within 200ms"));
    }

    #[tokio::test]
    async fn test_cancelled_validation() {
        let page = StubPage::new();
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ValidationContext::new(Some(TargetSpec::text("Go")), None);

        let result = DefaultGateValidator::default()
            .validate(&VerifyRule::ElementPresent, &ctx, &page, &clock, &cancel)
            .await;
        assert_eq!(result, Err(GateError::Cancelled));
    }
}
