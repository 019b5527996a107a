//! Workflow replay engine

use crate::errors::{FlowError, VariableError};
use crate::schema::validate_workflow;
use crate::strategies::{DefaultFailureHandler, FailureHandler, FailureHandlerResult};
use crate::types::*;
use crate::variables::{ResolvedVariables, VariableBindings, VariableProvider};
use action_executor::ActionExecutor;
use action_primitives::{probe, template, Action, FailureKind, PageDriver};
use async_recursion::async_recursion;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Workflow executor trait
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Replay a workflow against one page
    ///
    /// Returns `Err` only when the workflow fails validation; every other
    /// problem is reported in the [`RunReport`].
    async fn replay(
        &self,
        workflow: &Workflow,
        bindings: &VariableBindings,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, FlowError>;

    /// Validate workflow structure
    fn validate_workflow(&self, workflow: &Workflow) -> Result<(), FlowError>;
}

/// Per-run mutable state
struct RunContext<'a> {
    driver: &'a dyn PageDriver,
    cancel: &'a CancellationToken,
    variables: ResolvedVariables,
    steps: Vec<StepReport>,
    iteration: Option<u32>,
}

impl RunContext<'_> {
    fn record(&mut self, report: StepReport) {
        self.steps.push(report.with_iteration(self.iteration).finish());
    }
}

/// Replays workflows through an [`ActionExecutor`]
pub struct ReplayEngine {
    executor: Arc<ActionExecutor>,
    provider: Arc<dyn VariableProvider>,
    failure_handler: Arc<dyn FailureHandler>,
    config: ReplayConfig,
}

impl ReplayEngine {
    /// Create a new replay engine
    pub fn new(executor: Arc<ActionExecutor>, provider: Arc<dyn VariableProvider>) -> Self {
        Self {
            executor,
            provider,
            failure_handler: Arc::new(DefaultFailureHandler::new()),
            config: ReplayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = handler;
        self
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// Execute steps in order; `Err` stops the whole run
    #[async_recursion]
    async fn execute_steps<'a>(
        &self,
        steps: &[Step],
        ctx: &mut RunContext<'a>,
    ) -> Result<(), AbortReason> {
        for step in steps {
            if ctx.cancel.is_cancelled() {
                info!(step_id = step.id(), "Replay cancelled before step");
                return Err(AbortReason::Cancelled);
            }
            match step {
                Step::Action(action_step) => self.execute_action(action_step, ctx).await?,
                Step::Conditional(conditional) => {
                    self.execute_conditional(conditional, ctx).await?
                }
                Step::Loop(loop_step) => self.execute_loop(loop_step, ctx).await?,
            }
        }
        Ok(())
    }

    /// Execute single action step
    async fn execute_action(
        &self,
        step: &ActionStep,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), AbortReason> {
        let report = StepReport::new(step.id.clone(), "action");
        debug!(step_id = %step.id, action = %step.action.describe(), "Executing action step");

        let action = match self.bind(&step.action, ctx).await {
            Ok(action) => action,
            Err(err) => return Err(self.variable_abort(report, err, ctx)),
        };
        let fallback = match &step.fallback {
            Some(fallback) => match self.bind(fallback, ctx).await {
                Ok(action) => Some(action),
                Err(err) => return Err(self.variable_abort(report, err, ctx)),
            },
            None => None,
        };

        let outcome = self
            .executor
            .execute(&action, ctx.driver, fallback.as_ref(), ctx.cancel)
            .await;
        let decision =
            self.failure_handler
                .handle_outcome(&step.id, &outcome, action.error_policy.on_exhaustion);
        let report = report.with_outcome(outcome);

        match decision {
            FailureHandlerResult::Continue { status, reason } => {
                let report = report.with_status(status);
                ctx.record(match reason {
                    Some(reason) => report.with_reason(reason),
                    None => report,
                });
                Ok(())
            }
            FailureHandlerResult::Abort {
                status,
                reason,
                message,
            } => {
                ctx.record(report.with_status(status).with_reason(message));
                Err(reason)
            }
        }
    }

    /// Execute conditional branch
    async fn execute_conditional(
        &self,
        step: &ConditionalStep,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), AbortReason> {
        let report = StepReport::new(step.id.clone(), "conditional");
        let (holds, detail) = self.evaluate_probe(&step.check, ctx).await;

        let (branch, name) = if holds {
            (&step.then_branch, "then")
        } else {
            (&step.else_branch, "else")
        };
        info!(step_id = %step.id, branch = name, "Conditional evaluated: {}", detail);
        ctx.record(report.with_reason(format!("{}; taking {} branch", detail, name)));

        self.execute_steps(branch, ctx).await
    }

    /// Execute loop
    async fn execute_loop(
        &self,
        step: &LoopStep,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), AbortReason> {
        let report = StepReport::new(step.id.clone(), "loop");
        let max_iterations = step
            .max_iterations
            .unwrap_or(self.config.default_max_iterations)
            .max(1);
        let outer_iteration = ctx.iteration;
        debug!(step_id = %step.id, max_iterations, "Executing loop");

        let mut iterations = 0u32;
        let result = loop {
            if ctx.cancel.is_cancelled() {
                break Err(AbortReason::Cancelled);
            }

            let (holds, detail) = self.evaluate_probe(&step.condition, ctx).await;
            if !holds {
                debug!(step_id = %step.id, iterations, "Loop condition false: {}", detail);
                break Ok(None);
            }
            if iterations >= max_iterations {
                warn!(
                    step_id = %step.id,
                    max_iterations,
                    kind = %FailureKind::LoopBoundExceeded,
                    "Loop reached its bound with the condition still holding"
                );
                break Ok(Some(format!(
                    "{}: stopped after {} iterations while {}",
                    FailureKind::LoopBoundExceeded,
                    max_iterations,
                    step.condition
                )));
            }

            iterations += 1;
            ctx.iteration = Some(iterations);
            let body = self.execute_steps(&step.body, ctx).await;
            ctx.iteration = outer_iteration;
            if let Err(reason) = body {
                break Err(reason);
            }
        };

        match result {
            Ok(None) => {
                ctx.record(report.with_reason(format!("{} iteration(s)", iterations)));
                Ok(())
            }
            Ok(Some(bound)) => {
                ctx.record(report.with_status(StepStatus::BoundedExit).with_reason(bound));
                Ok(())
            }
            Err(reason) => {
                let status = if reason == AbortReason::Cancelled {
                    StepStatus::Cancelled
                } else {
                    StepStatus::Failed
                };
                ctx.record(
                    report
                        .with_status(status)
                        .with_reason(format!("stopped in iteration {}: {}", iterations, reason)),
                );
                Err(reason)
            }
        }
    }

    /// Zero-side-effect probe; driver errors count as "does not hold"
    async fn evaluate_probe(&self, check: &Probe, ctx: &RunContext<'_>) -> (bool, String) {
        match probe(ctx.driver, &check.target, check.require_visible).await {
            Ok(true) => (true, format!("{} holds", check)),
            Ok(false) => (false, format!("{} does not hold", check)),
            Err(err) => {
                warn!(target = %check.target, "Probe failed: {}", err);
                (false, format!("{} could not be evaluated: {}", check, err))
            }
        }
    }

    /// Substitute placeholders, prompting for per-use variables now
    async fn bind(&self, action: &Action, ctx: &RunContext<'_>) -> Result<Action, VariableError> {
        let names = action.placeholders();
        if names.is_empty() {
            return Ok(action.clone());
        }
        let values = ctx
            .variables
            .values_for(&names, self.provider.as_ref(), ctx.cancel)
            .await?;
        let mut bound = action.clone();
        bound.payload = action
            .payload
            .as_deref()
            .map(|payload| template::substitute(payload, |name| values.get(name).cloned()));
        Ok(bound)
    }

    fn variable_abort(
        &self,
        report: StepReport,
        err: VariableError,
        ctx: &mut RunContext<'_>,
    ) -> AbortReason {
        warn!(step_id = %report.step_id, "Variable resolution failed: {}", err);
        let (status, reason) = match &err {
            VariableError::Cancelled => (StepStatus::Cancelled, AbortReason::Cancelled),
            VariableError::Unresolved { name, reason } => (
                StepStatus::Failed,
                AbortReason::UnresolvedVariable {
                    name: name.clone(),
                    message: reason.clone(),
                },
            ),
        };
        ctx.record(report.with_status(status).with_reason(err.to_string()));
        reason
    }
}

#[async_trait]
impl FlowExecutor for ReplayEngine {
    async fn replay(
        &self,
        workflow: &Workflow,
        bindings: &VariableBindings,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, FlowError> {
        info!(workflow_id = %workflow.id, name = %workflow.name, "Replaying workflow");

        self.validate_workflow(workflow)?;

        let mut report = RunReport::new(workflow);
        if cancel.is_cancelled() {
            return Ok(report.with_abort(AbortReason::Cancelled).finish());
        }

        let variables =
            match ResolvedVariables::resolve(workflow, bindings, self.provider.as_ref(), cancel)
                .await
            {
                Ok(variables) => variables,
                Err(VariableError::Cancelled) => {
                    return Ok(report.with_abort(AbortReason::Cancelled).finish());
                }
                Err(VariableError::Unresolved { name, reason }) => {
                    warn!(workflow_id = %workflow.id, variable = %name, "Variable unresolved: {}", reason);
                    return Ok(report
                        .with_abort(AbortReason::UnresolvedVariable {
                            name,
                            message: reason,
                        })
                        .finish());
                }
            };

        let mut ctx = RunContext {
            driver,
            cancel,
            variables,
            steps: Vec::new(),
            iteration: None,
        };
        let result = self.execute_steps(&workflow.steps, &mut ctx).await;

        report.steps = ctx.steps;
        if let Err(reason) = result {
            warn!(workflow_id = %workflow.id, "Replay aborted: {}", reason);
            report = report.with_abort(reason);
        }
        let report = report.finish();
        info!(
            workflow_id = %workflow.id,
            status = %report.status,
            elapsed_ms = report.elapsed_ms,
            "Replay finished"
        );
        Ok(report)
    }

    fn validate_workflow(&self, workflow: &Workflow) -> Result<(), FlowError> {
        validate_workflow(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::StaticVariables;
    use action_executor::ExecutorConfig;
    use action_primitives::stub::{StubElement, StubPage};
    use action_primitives::{ErrorPolicy, Exhaustion, ManualClock, TargetSpec, VerifyRule};

    fn engine(provider: StaticVariables) -> ReplayEngine {
        let executor = ActionExecutor::new(ExecutorConfig::default())
            .with_clock(Arc::new(ManualClock::new()));
        ReplayEngine::new(Arc::new(executor), Arc::new(provider))
    }

    #[tokio::test]
    async fn test_schema_invalid_never_starts() {
        let page = StubPage::new();
        let workflow = Workflow::new(
            "bad",
            vec![Step::action("a", Action::fill(TargetSpec::label("Email"), "{{email}}"))],
        );
        let result = engine(StaticVariables::new())
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(FlowError::SchemaInvalid(_))));
        assert_eq!(page.resolve_calls(), 0);
    }

    #[tokio::test]
    async fn test_conditional_takes_else_branch() {
        let page = StubPage::with_elements([StubElement::button("login", "Log in")]);
        let workflow = Workflow::new(
            "maybe-dismiss",
            vec![Step::Conditional(ConditionalStep {
                id: "banner".into(),
                check: Probe::exists(TargetSpec::text("Accept cookies")),
                then_branch: vec![Step::action("accept", Action::click(TargetSpec::text("Accept cookies")))],
                else_branch: vec![Step::action("login", Action::click(TargetSpec::text("Log in")))],
            })],
        );

        let report = engine(StaticVariables::new())
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        let ids: Vec<_> = report.steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, vec!["banner", "login"]);
        assert!(report.steps[0].reason.as_deref().unwrap().contains("else branch"));
    }

    #[tokio::test]
    async fn test_loop_stops_when_condition_clears() {
        let page = StubPage::with_elements([StubElement::button("more", "Load more").removed_on_click()]);
        let workflow = Workflow::new(
            "load-all",
            vec![Step::Loop(LoopStep {
                id: "pages".into(),
                condition: Probe::exists(TargetSpec::text("Load more")),
                body: vec![Step::action("more", Action::click(TargetSpec::text("Load more")))],
                max_iterations: Some(5),
            })],
        );

        let report = engine(StaticVariables::new())
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.action_reports().count(), 1);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_replay() {
        let page = StubPage::with_elements([StubElement::button("b", "Later")]);
        let workflow = Workflow::new(
            "stops",
            vec![
                Step::action(
                    "missing",
                    Action::click(TargetSpec::text("Missing")).with_policy(ErrorPolicy::no_retry()),
                ),
                Step::action("later", Action::click(TargetSpec::text("Later"))),
            ],
        );

        let report = engine(StaticVariables::new())
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(
            report.abort_reason,
            Some(AbortReason::StepFailed {
                step_id: "missing".into(),
                kind: FailureKind::NotFound
            })
        );
        assert_eq!(report.steps.len(), 1);
        assert!(page.interactions().is_empty());
    }

    #[tokio::test]
    async fn test_skip_and_fallback_are_partial() {
        let page = StubPage::with_elements([StubElement::link("alt", "Continue")]);
        let workflow = Workflow::new(
            "partial",
            vec![
                Step::action(
                    "banner",
                    Action::click(TargetSpec::css("#banner"))
                        .with_policy(ErrorPolicy::new(0, 0, 1.0, Exhaustion::Skip)),
                ),
                Step::Action(
                    ActionStep {
                        id: "next".into(),
                        action: Action::click(TargetSpec::text("Next"))
                            .with_policy(ErrorPolicy::new(0, 0, 1.0, Exhaustion::Fallback)),
                        fallback: None,
                    }
                    .with_fallback(Action::click(TargetSpec::text("Continue"))),
                ),
            ],
        );

        let report = engine(StaticVariables::new())
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::PartiallyCompleted);
        assert_eq!(report.steps[0].status, StepStatus::Skipped);
        assert_eq!(report.steps[1].status, StepStatus::FallbackUsed);
        assert!(report.steps.iter().all(|s| s.reason.is_some()));
    }

    #[tokio::test]
    async fn test_per_step_prompt_resolved_lazily() {
        let page = StubPage::with_elements([StubElement::input("otp", "Code")]);
        let provider = StaticVariables::new()
            .with_answer("otp", "111")
            .with_answer("otp", "222");
        let workflow = Workflow::new(
            "otp",
            vec![
                Step::action(
                    "first",
                    Action::fill(TargetSpec::label("Code"), "{{otp}}")
                        .with_verify(VerifyRule::ValueEqualsPayload),
                ),
                Step::action("second", Action::fill(TargetSpec::label("Code"), "{{otp}}")),
            ],
        )
        .with_variable(
            "otp",
            VariableSource::Prompt {
                per_step_confirm: true,
            },
        );

        let report = engine(provider)
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(page.value_of("otp").as_deref(), Some("222"));
    }

    #[tokio::test]
    async fn test_unresolved_variable_aborts_before_steps() {
        let page = StubPage::with_elements([StubElement::input("email", "Email")]);
        let workflow = Workflow::new(
            "needs-email",
            vec![Step::action("email", Action::fill(TargetSpec::label("Email"), "{{email}}"))],
        )
        .with_variable("email", VariableSource::prompt());

        let report = engine(StaticVariables::new())
            .replay(&workflow, &VariableBindings::new(), &page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert!(matches!(
            report.abort_reason,
            Some(AbortReason::UnresolvedVariable { .. })
        ));
        assert!(report.steps.is_empty());
    }
}
