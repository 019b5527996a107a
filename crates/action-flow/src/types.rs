//! Core types for workflow replay

use action_executor::Outcome;
use action_primitives::{template, Action, FailureKind, TargetSpec};
use chrono::{DateTime, Utc};
use pagewright_core_types::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default safety bound for loops that do not declare one
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Workflow definition - a named, replayable step program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier
    #[serde(default)]
    pub id: WorkflowId,

    /// Workflow name
    pub name: String,

    /// Workflow description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Placeholder name to declared value source
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSource>,

    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl Workflow {
    /// Create a new hand-authored workflow
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            description: String::new(),
            steps,
            variables: BTreeMap::new(),
            metadata: WorkflowMetadata::default(),
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a variable
    pub fn with_variable(mut self, name: impl Into<String>, source: VariableSource) -> Self {
        self.variables.insert(name.into(), source);
        self
    }

    pub fn with_metadata(mut self, metadata: WorkflowMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Every placeholder referenced by any payload, including fallbacks and
    /// nested branches (deduplicated, in first-use order)
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        for step in &self.steps {
            step.collect_placeholders(&mut names);
        }
        names
    }

    /// Number of action steps, counting nested ones
    pub fn action_count(&self) -> usize {
        self.steps.iter().map(Step::action_count).sum()
    }
}

/// One node of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Single action step
    Action(ActionStep),

    /// Branch on a probe
    Conditional(ConditionalStep),

    /// Repeat a body while a probe holds
    Loop(LoopStep),
}

impl Step {
    pub fn action(id: impl Into<String>, action: Action) -> Self {
        Step::Action(ActionStep {
            id: id.into(),
            action,
            fallback: None,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Step::Action(step) => &step.id,
            Step::Conditional(step) => &step.id,
            Step::Loop(step) => &step.id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Step::Action(_) => "action",
            Step::Conditional(_) => "conditional",
            Step::Loop(_) => "loop",
        }
    }

    fn action_count(&self) -> usize {
        match self {
            Step::Action(_) => 1,
            Step::Conditional(step) => step
                .then_branch
                .iter()
                .chain(step.else_branch.iter())
                .map(Step::action_count)
                .sum(),
            Step::Loop(step) => step.body.iter().map(Step::action_count).sum(),
        }
    }

    fn collect_placeholders(&self, names: &mut Vec<String>) {
        match self {
            Step::Action(step) => {
                push_placeholders(names, step.action.payload.as_deref());
                if let Some(fallback) = &step.fallback {
                    push_placeholders(names, fallback.payload.as_deref());
                }
            }
            Step::Conditional(step) => {
                for child in step.then_branch.iter().chain(step.else_branch.iter()) {
                    child.collect_placeholders(names);
                }
            }
            Step::Loop(step) => {
                for child in &step.body {
                    child.collect_placeholders(names);
                }
            }
        }
    }
}

fn push_placeholders(names: &mut Vec<String>, text: Option<&str>) {
    for name in text.map(template::placeholders).unwrap_or_default() {
        if !names.contains(&name) {
            names.push(name);
        }
    }
}

/// Action plus the alternate used when its policy is `fallback`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Step identifier
    pub id: String,

    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Action>,
}

impl ActionStep {
    pub fn with_fallback(mut self, fallback: Action) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Zero-side-effect existence (optionally visibility) check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub target: TargetSpec,

    #[serde(default)]
    pub require_visible: bool,
}

impl Probe {
    pub fn exists(target: TargetSpec) -> Self {
        Self {
            target,
            require_visible: false,
        }
    }

    pub fn visible(target: TargetSpec) -> Self {
        Self {
            target,
            require_visible: true,
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.require_visible {
            write!(f, "{} is visible", self.target)
        } else {
            write!(f, "{} exists", self.target)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalStep {
    pub id: String,
    pub check: Probe,
    pub then_branch: Vec<Step>,
    #[serde(default)]
    pub else_branch: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStep {
    pub id: String,
    pub condition: Probe,
    pub body: Vec<Step>,

    /// Safety bound; the replay configuration's default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

/// Where a placeholder's value comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VariableSource {
    /// Fixed value stored in the workflow
    Literal { value: String },

    /// Ask the user; with `per_step_confirm` ask again at every use
    Prompt {
        #[serde(default)]
        per_step_confirm: bool,
    },

    /// Clipboard suggestion, falling back to a prompt
    Clipboard,
}

impl VariableSource {
    pub fn literal(value: impl Into<String>) -> Self {
        VariableSource::Literal {
            value: value.into(),
        }
    }

    pub fn prompt() -> Self {
        VariableSource::Prompt {
            per_step_confirm: false,
        }
    }
}

/// How a workflow came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOrigin {
    #[default]
    HandAuthored,
    DetectedPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub origin: WorkflowOrigin,

    /// Occurrences seen when the workflow was promoted from a pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_count: Option<u32>,
}

impl Default for WorkflowMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            origin: WorkflowOrigin::HandAuthored,
            repetition_count: None,
        }
    }
}

impl WorkflowMetadata {
    pub fn detected(repetition_count: u32) -> Self {
        Self {
            created_at: Utc::now(),
            origin: WorkflowOrigin::DetectedPattern,
            repetition_count: Some(repetition_count),
        }
    }
}

/// Replay tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Bound applied to loops without `max_iterations`
    pub default_max_iterations: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Final status of a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    PartiallyCompleted,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::PartiallyCompleted => f.write_str("partially_completed"),
            RunStatus::Aborted => f.write_str("aborted"),
        }
    }
}

/// Why a replay stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    Cancelled,
    StepFailed { step_id: String, kind: FailureKind },
    UnresolvedVariable { name: String, message: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::StepFailed { step_id, kind } => {
                write!(f, "step '{}' failed: {}", step_id, kind)
            }
            AbortReason::UnresolvedVariable { name, message } => {
                write!(f, "variable '{}' unresolved: {}", name, message)
            }
        }
    }
}

/// Per-step status in a run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Skipped,
    FallbackUsed,
    Failed,
    Cancelled,
    /// Loop stopped on its safety bound
    BoundedExit,
}

impl StepStatus {
    /// Statuses that make the run partially completed
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            StepStatus::Skipped
                | StepStatus::FallbackUsed
                | StepStatus::Failed
                | StepStatus::BoundedExit
        )
    }
}

/// Step execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step identifier
    pub step_id: String,

    /// Step type
    pub step_type: String,

    pub status: StepStatus,

    /// Executor outcome for action steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    /// Loop iteration (1-based) the step ran in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,

    /// Human-readable explanation, always set for non-success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,

    /// Latency in milliseconds
    pub latency_ms: u64,
}

impl StepReport {
    /// Create a new step report
    pub fn new(step_id: impl Into<String>, step_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step_id: step_id.into(),
            step_type: step_type.into(),
            status: StepStatus::Success,
            outcome: None,
            iteration: None,
            reason: None,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_iteration(mut self, iteration: Option<u32>) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self
    }
}

/// Replay result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub status: RunStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,

    pub steps: Vec<StepReport>,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,

    pub elapsed_ms: u64,
}

impl RunReport {
    /// Create a new run report
    pub fn new(workflow: &Workflow) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            status: RunStatus::Completed,
            abort_reason: None,
            steps: Vec::new(),
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
        }
    }

    /// Add step report
    pub fn with_step(mut self, step: StepReport) -> Self {
        self.steps.push(step);
        self
    }

    /// Mark as aborted
    pub fn with_abort(mut self, reason: AbortReason) -> Self {
        self.status = RunStatus::Aborted;
        self.abort_reason = Some(reason);
        self
    }

    /// Derive the final status and set the finish time
    pub fn finish(mut self) -> Self {
        if self.status != RunStatus::Aborted {
            self.status = if self.steps.iter().any(|s| s.status.is_partial()) {
                RunStatus::PartiallyCompleted
            } else {
                RunStatus::Completed
            };
        }
        self.finished_at = Utc::now();
        self.elapsed_ms = (self.finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort_reason == Some(AbortReason::Cancelled)
    }

    /// Reports of action steps only
    pub fn action_reports(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_some())
    }

    /// Multi-line human-readable summary
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} '{}' in {}ms",
            self.status, self.workflow_name, self.elapsed_ms
        );
        if let Some(reason) = &self.abort_reason {
            out.push_str(&format!(" ({})", reason));
        }
        for step in &self.steps {
            let iteration = step
                .iteration
                .map(|i| format!(" #{}", i))
                .unwrap_or_default();
            out.push_str(&format!(
                "\n  [{}{}] {} {:?}",
                step.step_id, iteration, step.step_type, step.status
            ));
            if let Some(reason) = &step.reason {
                out.push_str(&format!(": {}", reason));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::VerifyRule;

    #[test]
    fn test_step_serialized_shape() {
        let step = Step::action("s1", Action::click(TargetSpec::text("Submit")));
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "action");
        assert_eq!(json["id"], "s1");
        assert_eq!(json["action"]["kind"], "click");
        assert_eq!(json["action"]["target"]["text"]["text"], "Submit");
    }

    #[test]
    fn test_placeholders_cover_nested_steps() {
        let workflow = Workflow::new(
            "signup",
            vec![
                Step::action("email", Action::fill(TargetSpec::label("Email"), "{{email}}")),
                Step::Loop(LoopStep {
                    id: "pages".into(),
                    condition: Probe::exists(TargetSpec::text("Next")),
                    body: vec![Step::Action(
                        ActionStep {
                            id: "search".into(),
                            action: Action::fill(TargetSpec::label("Search"), "{{query}} {{email}}"),
                            fallback: None,
                        }
                        .with_fallback(Action::type_text(TargetSpec::css("#q"), "{{alt}}")),
                    )],
                    max_iterations: None,
                }),
                Step::action(
                    "submit",
                    Action::click(TargetSpec::text("Submit")).with_verify(VerifyRule::ElementAbsent),
                ),
            ],
        );
        assert_eq!(workflow.placeholders(), vec!["email", "query", "alt"]);
        assert_eq!(workflow.action_count(), 3);
    }

    #[test]
    fn test_run_status_derivation() {
        let workflow = Workflow::new("w", vec![]);
        let report = RunReport::new(&workflow)
            .with_step(StepReport::new("a", "action"))
            .finish();
        assert_eq!(report.status, RunStatus::Completed);

        let report = RunReport::new(&workflow)
            .with_step(StepReport::new("a", "action").with_status(StepStatus::Skipped))
            .finish();
        assert_eq!(report.status, RunStatus::PartiallyCompleted);

        let report = RunReport::new(&workflow)
            .with_step(StepReport::new("a", "action").with_status(StepStatus::Skipped))
            .with_abort(AbortReason::Cancelled)
            .finish();
        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.is_cancelled());
    }

    #[test]
    fn test_variable_source_shape() {
        let json = serde_json::to_value(VariableSource::Prompt {
            per_step_confirm: true,
        })
        .unwrap();
        assert_eq!(json["source"], "prompt");
        assert_eq!(json["per_step_confirm"], true);

        let parsed: VariableSource = serde_json::from_str(r#"{"source":"clipboard"}"#).unwrap();
        assert_eq!(parsed, VariableSource::Clipboard);
    }
}
