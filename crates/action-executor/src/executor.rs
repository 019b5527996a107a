//! Attempt loop with readiness, verification and exponential backoff

use std::sync::Arc;

use action_gate::{DefaultGateValidator, GateError, GateValidator, ValidationContext};
use action_primitives::{
    ensure_in_viewport, normalize_url, perform, resolve_single, sleep_or_cancel, Action,
    ActionKind, Clock, ElementHandle, ElementIdentity, Exhaustion, FailureKind, PageDriver,
    StabilityWait, TokioClock, VerifyRule,
};
use chrono::Utc;
use pagewright_core_types::ActionId;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::ExecutorConfig,
    observation::{AttemptOutcome, Observation, ObservationSink},
    outcome::Outcome,
};

/// Failure of a single attempt
#[derive(Debug, Clone)]
struct AttemptFailure {
    kind: FailureKind,
    message: String,
}

impl AttemptFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled")
    }
}

struct AttemptResult {
    identity: Option<ElementIdentity>,
    result: Result<String, AttemptFailure>,
}

/// Executes single actions against one page
///
/// Calls are serialised: a second `execute` waits until the first returns.
pub struct ActionExecutor {
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn GateValidator>,
    sink: Option<Arc<dyn ObservationSink>>,
    in_flight: Mutex<()>,
}

impl ActionExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let gate = DefaultGateValidator::new(config.verify_timeout_ms, config.verify_poll_ms);
        Self {
            config,
            clock: Arc::new(TokioClock::new()),
            gate: Arc::new(gate),
            sink: None,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn GateValidator>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Execute `action`, retrying per its error policy
    ///
    /// `fallback` is attempted once when the policy is [`Exhaustion::Fallback`]
    /// and every attempt failed. Cancellation is checked between attempts and
    /// cuts backoff, readiness and verification waits short.
    pub async fn execute(
        &self,
        action: &Action,
        driver: &dyn PageDriver,
        fallback: Option<&Action>,
        cancel: &CancellationToken,
    ) -> Outcome {
        let _guard = self.in_flight.lock().await;
        let action_id = ActionId::new();

        if let Err(err) = action.validate() {
            warn!(action_id = %action_id, "rejecting invalid action: {}", err);
            return Outcome::failure(FailureKind::SchemaInvalid, err.to_string(), 0);
        }

        let policy = &action.error_policy;
        let max_attempts = policy.max_attempts();
        info!(
            action_id = %action_id,
            action = %action.describe(),
            max_attempts,
            "Executing action"
        );

        let mut last = AttemptFailure::new(FailureKind::NotFound, "no attempt made");
        let mut attempts = 0u32;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                info!(action_id = %action_id, attempt, "cancelled before attempt");
                return Outcome::cancelled(attempts);
            }

            attempts = attempt + 1;
            let outcome = self.attempt_once(action, driver, cancel).await;
            self.observe(&action_id, action, &outcome, attempts, false);

            match outcome.result {
                Ok(detail) => {
                    info!(action_id = %action_id, attempt = attempts, "action succeeded");
                    return Outcome::success(detail, attempts);
                }
                Err(failure) if failure.kind == FailureKind::Cancelled => {
                    info!(action_id = %action_id, attempt = attempts, "cancelled during attempt");
                    return Outcome::cancelled(attempts);
                }
                Err(failure) => {
                    warn!(
                        action_id = %action_id,
                        attempt = attempts,
                        kind = %failure.kind,
                        "attempt failed: {}",
                        failure.message
                    );
                    let retryable = failure.kind.is_retryable();
                    last = failure;
                    if !retryable {
                        break;
                    }
                }
            }

            if attempts < max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                debug!(action_id = %action_id, attempt = attempts, delay_ms = delay.as_millis() as u64, "backing off");
                if sleep_or_cancel(self.clock.as_ref(), delay, cancel).await.is_err() {
                    info!(action_id = %action_id, attempt = attempts, "cancelled during backoff");
                    return Outcome::cancelled(attempts);
                }
            }
        }

        match policy.on_exhaustion {
            Exhaustion::Abort => {
                warn!(action_id = %action_id, attempts, kind = %last.kind, "attempts exhausted");
                Outcome::failure(last.kind, last.message, attempts)
            }
            Exhaustion::Skip => {
                info!(action_id = %action_id, attempts, "attempts exhausted, skipping");
                Outcome::skipped(
                    format!("skipped after {} attempt(s): {}: {}", attempts, last.kind, last.message),
                    attempts,
                )
            }
            Exhaustion::Fallback => match fallback {
                Some(alternate) => {
                    self.run_fallback(&action_id, alternate, driver, cancel, attempts, last)
                        .await
                }
                None => {
                    warn!(action_id = %action_id, "fallback requested but none supplied");
                    Outcome::failure(
                        last.kind,
                        format!("{} (no fallback action supplied)", last.message),
                        attempts,
                    )
                }
            },
        }
    }

    async fn run_fallback(
        &self,
        action_id: &ActionId,
        alternate: &Action,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
        attempts: u32,
        last: AttemptFailure,
    ) -> Outcome {
        if let Err(err) = alternate.validate() {
            return Outcome::failure(
                FailureKind::SchemaInvalid,
                format!("invalid fallback action: {}", err),
                attempts,
            );
        }
        if cancel.is_cancelled() {
            return Outcome::cancelled(attempts);
        }

        info!(action_id = %action_id, fallback = %alternate.describe(), "running fallback action");
        let outcome = self.attempt_once(alternate, driver, cancel).await;
        let attempts = attempts + 1;
        self.observe(action_id, alternate, &outcome, attempts, true);

        match outcome.result {
            Ok(detail) => Outcome::Success {
                detail: format!("{} (fallback after {}: {})", detail, last.kind, last.message),
                attempts,
                skipped: false,
                fallback_used: true,
            },
            Err(failure) if failure.kind == FailureKind::Cancelled => Outcome::cancelled(attempts),
            Err(failure) => Outcome::failure(
                failure.kind,
                format!("fallback failed: {}", failure.message),
                attempts,
            ),
        }
    }

    async fn attempt_once(
        &self,
        action: &Action,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        let mut identity = None;
        let result = self
            .attempt_steps(action, driver, cancel, &mut identity)
            .await;
        AttemptResult { identity, result }
    }

    async fn attempt_steps(
        &self,
        action: &Action,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
        identity: &mut Option<ElementIdentity>,
    ) -> Result<String, AttemptFailure> {
        // Assert observes only: its rule re-resolves the target itself
        if action.kind == ActionKind::Assert {
            let rule = action.verify.clone().unwrap_or(VerifyRule::ElementPresent);
            return self.verify(action, &rule, driver, cancel).await;
        }

        let element = match &action.target {
            Some(target) => {
                let handle = resolve_single(driver, target)
                    .await
                    .map_err(|failure| AttemptFailure::new(failure.kind, failure.message))?;
                *identity = describe_identity(driver, &handle).await;
                Some(handle)
            }
            None => None,
        };

        if let Some(handle) = &element {
            let wait = StabilityWait::new(self.config.ready_timeout_ms, self.config.stability_poll_ms);
            let bbox = wait
                .wait(driver, handle, self.clock.as_ref(), cancel)
                .await
                .map_err(|err| AttemptFailure::new(err.failure_kind(), err.message()))?;

            ensure_in_viewport(driver, handle, &bbox)
                .await
                .map_err(|err| AttemptFailure::new(err.failure_kind(), err.to_string()))?;
        }

        if cancel.is_cancelled() {
            return Err(AttemptFailure::cancelled());
        }

        let detail = perform(driver, action.kind, element.as_ref(), action.payload.as_deref())
            .await
            .map_err(|err| AttemptFailure::new(err.failure_kind(), err.to_string()))?;

        match &action.verify {
            Some(rule) => {
                let verified = self.verify(action, rule, driver, cancel).await?;
                Ok(format!("{}; {}", detail, verified))
            }
            None => Ok(detail),
        }
    }

    async fn verify(
        &self,
        action: &Action,
        rule: &VerifyRule,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<String, AttemptFailure> {
        let context = ValidationContext::new(action.target.clone(), action.payload.clone());
        let result = self
            .gate
            .validate(rule, &context, driver, self.clock.as_ref(), cancel)
            .await
            .map_err(|err| match err {
                GateError::Cancelled => AttemptFailure::cancelled(),
                GateError::InvalidSpec(msg) => AttemptFailure::new(FailureKind::SchemaInvalid, msg),
                GateError::Driver(err) => AttemptFailure::new(err.failure_kind(), err.to_string()),
            })?;

        if result.passed {
            Ok(format!("verified {}", rule.name()))
        } else {
            Err(AttemptFailure::new(
                FailureKind::VerificationFailed,
                result.summary(),
            ))
        }
    }

    fn observe(
        &self,
        action_id: &ActionId,
        action: &Action,
        attempt: &AttemptResult,
        number: u32,
        fallback: bool,
    ) {
        let Some(sink) = &self.sink else {
            return;
        };
        let mut concrete = action.clone();
        if concrete.kind == ActionKind::Navigate {
            concrete.payload = concrete.payload.as_deref().map(normalize_url);
        }
        let outcome = match &attempt.result {
            Ok(detail) => AttemptOutcome::Success {
                detail: detail.clone(),
            },
            Err(failure) => AttemptOutcome::Failure {
                kind: failure.kind,
                message: failure.message.clone(),
            },
        };
        sink.record(Observation {
            seq: 0,
            action_id: action_id.clone(),
            action: concrete,
            resolved_identity: attempt.identity.clone(),
            outcome,
            attempt: number,
            fallback,
            timestamp: Utc::now(),
        });
    }
}

async fn describe_identity(driver: &dyn PageDriver, handle: &ElementHandle) -> Option<ElementIdentity> {
    match driver.describe(handle).await {
        Ok(description) => description.identity(),
        Err(err) => {
            debug!(element = %handle, "could not describe element: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::MemorySink;
    use action_primitives::stub::{Interaction, StubElement, StubPage};
    use action_primitives::{ErrorPolicy, ManualClock, TargetSpec};
    use std::time::Duration;

    fn executor(clock: Arc<ManualClock>, sink: Arc<MemorySink>) -> ActionExecutor {
        ActionExecutor::new(ExecutorConfig::default())
            .with_clock(clock)
            .with_sink(sink)
    }

    #[tokio::test]
    async fn test_missing_target_uses_n_plus_one_resolutions() {
        let page = StubPage::new();
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(MemorySink::new());
        let action = Action::click(TargetSpec::text("Missing"))
            .with_policy(ErrorPolicy::new(3, 100, 2.0, Exhaustion::Abort));

        let outcome = executor(clock.clone(), sink.clone())
            .execute(&action, &page, None, &CancellationToken::new())
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(page.resolve_calls(), 4);
        assert_eq!(sink.len(), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn test_element_appearing_late_succeeds_on_retry() {
        let page = StubPage::with_elements([StubElement::button("go", "Go").appears_after(1)]);
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(MemorySink::new());
        let action = Action::click(TargetSpec::text("Go"));

        let outcome = executor(clock, sink.clone())
            .execute(&action, &page, None, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 2);
        let entries = sink.entries();
        assert!(!entries[0].outcome.is_success());
        assert!(entries[1].outcome.is_success());
        assert_eq!(entries[1].resolved_identity.as_ref().unwrap().stable_attr, "go");
    }

    #[tokio::test]
    async fn test_verification_failure_is_not_success() {
        let page = StubPage::with_elements([StubElement::input("email", "Email").ignores_input()]);
        let clock = Arc::new(ManualClock::new());
        let action = Action::fill(TargetSpec::label("Email"), "a@b.com")
            .with_verify(VerifyRule::ValueEqualsPayload)
            .with_policy(ErrorPolicy::no_retry());

        let outcome = executor(clock, Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::VerificationFailed));
        assert_eq!(
            page.interactions(),
            vec![Interaction::SetValue(
                ElementHandle::new("email"),
                "a@b.com".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_ambiguous_target() {
        let page = StubPage::with_elements([
            StubElement::button("a", "Save"),
            StubElement::button("b", "Save"),
        ]);
        let action = Action::click(TargetSpec::text("Save")).with_policy(ErrorPolicy::no_retry());

        let outcome = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Ambiguous));
    }

    #[tokio::test]
    async fn test_ambiguous_target_is_retried() {
        let page = StubPage::with_elements([
            StubElement::button("a", "Save"),
            StubElement::button("b", "Save"),
        ]);
        let action = Action::click(TargetSpec::text("Save"))
            .with_policy(ErrorPolicy::new(2, 50, 1.0, Exhaustion::Abort));

        let outcome = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Ambiguous));
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(page.resolve_calls(), 3);
    }

    #[tokio::test]
    async fn test_shifting_layout_waits_then_scrolls() {
        let page = StubPage::with_elements([StubElement::button("far", "Far").offscreen().shifting(2)]);
        let clock = Arc::new(ManualClock::new());
        let action = Action::click(TargetSpec::text("Far"));

        let outcome = executor(clock.clone(), Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(
            page.interactions(),
            vec![
                Interaction::Scroll(ElementHandle::new("far")),
                Interaction::Click(ElementHandle::new("far"))
            ]
        );
        assert!(clock.total_slept() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_never_stable_is_not_ready() {
        let page = StubPage::with_elements([StubElement::button("jumpy", "Jumpy").never_settles()]);
        let clock = Arc::new(ManualClock::new());
        let action = Action::click(TargetSpec::text("Jumpy")).with_policy(ErrorPolicy::no_retry());

        let outcome = executor(clock, Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotReady));
    }

    #[tokio::test]
    async fn test_skip_on_exhaustion() {
        let page = StubPage::new();
        let action = Action::click(TargetSpec::css("#cookie-banner"))
            .with_policy(ErrorPolicy::new(1, 10, 1.0, Exhaustion::Skip));

        let outcome = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;
        assert!(outcome.is_skipped());
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn test_fallback_runs_once() {
        let page = StubPage::with_elements([StubElement::link("alt", "Continue")]);
        let sink = Arc::new(MemorySink::new());
        let action = Action::click(TargetSpec::text("Next"))
            .with_policy(ErrorPolicy::new(1, 10, 1.0, Exhaustion::Fallback));
        let fallback = Action::click(TargetSpec::text("Continue"));

        let outcome = executor(Arc::new(ManualClock::new()), sink.clone())
            .execute(&action, &page, Some(&fallback), &CancellationToken::new())
            .await;

        assert!(outcome.used_fallback());
        assert_eq!(outcome.attempts(), 3);
        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[2].fallback);
    }

    #[tokio::test]
    async fn test_missing_fallback_surfaces_failure() {
        let page = StubPage::new();
        let action = Action::click(TargetSpec::text("Next"))
            .with_policy(ErrorPolicy::new(0, 10, 1.0, Exhaustion::Fallback));

        let outcome = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &CancellationToken::new())
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
        assert!(outcome.message().contains("no fallback"));
    }

    #[tokio::test]
    async fn test_cancellation_is_not_skipped() {
        let page = StubPage::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let action = Action::click(TargetSpec::text("Next"))
            .with_policy(ErrorPolicy::default().with_exhaustion(Exhaustion::Skip));

        let outcome = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()))
            .execute(&action, &page, None, &cancel)
            .await;
        assert!(outcome.is_cancelled());
        assert_eq!(page.resolve_calls(), 0);
    }

    #[tokio::test]
    async fn test_navigate_records_normalised_url() {
        let page = StubPage::new();
        let sink = Arc::new(MemorySink::new());
        let outcome = executor(Arc::new(ManualClock::new()), sink.clone())
            .execute(&Action::navigate("example.com"), &page, None, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(page.navigated_url().as_deref(), Some("https://example.com"));
        assert_eq!(
            sink.entries()[0].action.payload.as_deref(),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn test_assert_element_absent() {
        let page = StubPage::with_elements([StubElement::new("spinner")]);
        let action = Action::assert(TargetSpec::css("#spinner"), VerifyRule::ElementAbsent)
            .with_policy(ErrorPolicy::no_retry());
        let exec = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()));

        let outcome = exec.execute(&action, &page, None, &CancellationToken::new()).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::VerificationFailed));

        page.remove("spinner");
        let outcome = exec.execute(&action, &page, None, &CancellationToken::new()).await;
        assert!(outcome.is_success());
    }

    #[test]
    fn test_click_retries_after_intercepted_click() {
        tokio_test::block_on(async {
            let page = StubPage::with_elements([StubElement::button("buy", "Buy").failing_clicks(1)]);
            let outcome = executor(Arc::new(ManualClock::new()), Arc::new(MemorySink::new()))
                .execute(&Action::click(TargetSpec::text("Buy")), &page, None, &CancellationToken::new())
                .await;
            assert!(outcome.is_success());
            assert_eq!(outcome.attempts(), 2);
        });
    }
}
