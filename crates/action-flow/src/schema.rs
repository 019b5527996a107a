//! Persisted workflow documents and load-time validation

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::types::{Step, Workflow};

/// On-disk document format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowFormat {
    Json,
    Yaml,
}

impl WorkflowFormat {
    pub fn from_path(path: &Path) -> Result<Self, FlowError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Ok(WorkflowFormat::Json),
            Some("yaml") | Some("yml") => Ok(WorkflowFormat::Yaml),
            _ => Err(FlowError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parse and validate a document
    ///
    /// Syntax errors are [`FlowError::Parse`]. A well-formed document whose
    /// shape does not describe a workflow (unknown fields, a target with zero
    /// or several strategies) is [`FlowError::SchemaInvalid`].
    pub fn parse(&self, text: &str) -> Result<Workflow, FlowError> {
        let workflow: Workflow = match self {
            WorkflowFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(text).map_err(|e| FlowError::Parse(e.to_string()))?;
                serde_json::from_value(value)
                    .map_err(|e| FlowError::SchemaInvalid(e.to_string()))?
            }
            WorkflowFormat::Yaml => {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(text).map_err(|e| FlowError::Parse(e.to_string()))?;
                serde_yaml::from_value(value)
                    .map_err(|e| FlowError::SchemaInvalid(e.to_string()))?
            }
        };
        validate_workflow(&workflow)?;
        Ok(workflow)
    }

    pub fn render(&self, workflow: &Workflow) -> Result<String, FlowError> {
        match self {
            WorkflowFormat::Json => {
                serde_json::to_string_pretty(workflow).map_err(|e| FlowError::Parse(e.to_string()))
            }
            WorkflowFormat::Yaml => {
                serde_yaml::to_string(workflow).map_err(|e| FlowError::Parse(e.to_string()))
            }
        }
    }
}

/// Read, parse and validate a workflow document
pub fn load_workflow(path: &Path) -> Result<Workflow, FlowError> {
    let format = WorkflowFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let workflow = format.parse(&text)?;
    info!(
        workflow_id = %workflow.id,
        path = %path.display(),
        steps = workflow.steps.len(),
        "Loaded workflow"
    );
    Ok(workflow)
}

/// Validate and write a workflow document
pub fn save_workflow(workflow: &Workflow, path: &Path) -> Result<(), FlowError> {
    validate_workflow(workflow)?;
    let format = WorkflowFormat::from_path(path)?;
    let text = format.render(workflow)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    info!(workflow_id = %workflow.id, path = %path.display(), "Saved workflow");
    Ok(())
}

/// Load-time validation
///
/// Rejects empty workflows, duplicate step ids, invalid actions (payload and
/// target invariants, error policy ranges), zero loop bounds and placeholders
/// without a declared variable.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), FlowError> {
    if workflow.name.trim().is_empty() {
        return Err(FlowError::SchemaInvalid("workflow name is empty".to_string()));
    }
    if workflow.steps.is_empty() {
        return Err(FlowError::SchemaInvalid(format!(
            "workflow '{}' has no steps",
            workflow.name
        )));
    }

    let mut ids = HashSet::new();
    validate_steps(&workflow.steps, &mut ids)?;

    for name in workflow.placeholders() {
        if !workflow.variables.contains_key(&name) {
            return Err(FlowError::SchemaInvalid(format!(
                "placeholder '{{{{{}}}}}' is not declared in variables",
                name
            )));
        }
    }

    let used = workflow.placeholders();
    for name in workflow.variables.keys() {
        if !used.contains(name) {
            warn!(workflow_id = %workflow.id, variable = %name, "declared variable is never used");
        }
    }

    debug!(workflow_id = %workflow.id, steps = ids.len(), "workflow is valid");
    Ok(())
}

fn validate_steps(steps: &[Step], ids: &mut HashSet<String>) -> Result<(), FlowError> {
    for step in steps {
        let id = step.id();
        if id.trim().is_empty() {
            return Err(FlowError::SchemaInvalid(format!(
                "{} step without id",
                step.type_name()
            )));
        }
        if !ids.insert(id.to_string()) {
            return Err(FlowError::SchemaInvalid(format!("duplicate step id '{}'", id)));
        }

        match step {
            Step::Action(action_step) => {
                action_step
                    .action
                    .validate()
                    .map_err(|e| step_error(id, e))?;
                if let Some(fallback) = &action_step.fallback {
                    fallback
                        .validate()
                        .map_err(|e| step_error(id, format!("fallback: {}", e)))?;
                }
            }
            Step::Conditional(conditional) => {
                validate_steps(&conditional.then_branch, ids)?;
                validate_steps(&conditional.else_branch, ids)?;
            }
            Step::Loop(loop_step) => {
                if loop_step.max_iterations == Some(0) {
                    return Err(step_error(id, "max_iterations must be at least 1"));
                }
                if loop_step.body.is_empty() {
                    return Err(step_error(id, "loop body is empty"));
                }
                validate_steps(&loop_step.body, ids)?;
            }
        }
    }
    Ok(())
}

fn step_error(step_id: &str, err: impl std::fmt::Display) -> FlowError {
    FlowError::SchemaInvalid(format!("step '{}': {}", step_id, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariableSource;
    use action_primitives::{Action, TargetSpec};

    fn signup() -> Workflow {
        Workflow::new(
            "signup",
            vec![
                Step::action("email", Action::fill(TargetSpec::label("Email"), "{{email}}")),
                Step::action("submit", Action::click(TargetSpec::text("Submit"))),
            ],
        )
        .with_variable("email", VariableSource::prompt())
    }

    #[test]
    fn test_valid_workflow() {
        assert!(validate_workflow(&signup()).is_ok());
    }

    #[test]
    fn test_undeclared_placeholder_rejected() {
        let mut workflow = signup();
        workflow.variables.clear();
        let err = validate_workflow(&workflow).unwrap_err();
        assert!(err.is_schema_invalid());
        assert!(err.to_string().contains("{{email}}"));
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let mut workflow = signup();
        workflow.steps.push(Step::action("email", Action::click(TargetSpec::text("Again"))));
        assert!(validate_workflow(&workflow).is_err());
    }

    #[test]
    fn test_zero_strategy_target_is_schema_invalid() {
        let doc = r#"{
            "name": "broken",
            "steps": [{"type": "action", "id": "a", "action": {"kind": "click", "target": {}}}]
        }"#;
        let err = WorkflowFormat::Json.parse(doc).unwrap_err();
        assert!(err.is_schema_invalid(), "{:?}", err);
        assert!(err.to_string().contains("exactly one targeting strategy"));
    }

    #[test]
    fn test_two_strategy_target_is_schema_invalid() {
        let doc = r##"
name: broken
steps:
  - type: action
    id: a
    action:
      kind: click
      target:
        css: "#go"
        label: Go
"##;
        let err = WorkflowFormat::Yaml.parse(doc).unwrap_err();
        assert!(err.is_schema_invalid(), "{:?}", err);
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = WorkflowFormat::Json.parse("{\"name\": ").unwrap_err();
        assert!(matches!(err, FlowError::Parse(_)));
    }

    #[test]
    fn test_malformed_policy_rejected() {
        let doc = r##"
name: bad-policy
steps:
  - type: action
    id: go
    action:
      kind: click
      target:
        css: "#go"
      error_policy:
        max_retries: 3
        backoff_multiplier: -1.0
"##;
        let err = WorkflowFormat::Yaml.parse(doc).unwrap_err();
        assert!(err.is_schema_invalid());
        assert!(err.to_string().contains("backoff_multiplier"));
    }

    #[test]
    fn test_save_and_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows").join("signup.yaml");
        let workflow = signup();
        save_workflow(&workflow, &path).unwrap();
        let loaded = load_workflow(&path).unwrap();
        assert_eq!(loaded.id, workflow.id);
        assert_eq!(loaded.steps, workflow.steps);
        assert_eq!(loaded.variables, workflow.variables);
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            WorkflowFormat::from_path(Path::new("flow.txt")),
            Err(FlowError::UnsupportedFormat(_))
        ));
    }
}
