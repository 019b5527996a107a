use std::path::PathBuf;

use action_flow::{load_workflow, Step, VariableSource, Workflow};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    pub action: WorkflowAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum WorkflowAction {
    /// Load and schema-validate a workflow document
    Validate {
        /// Workflow document (.json, .yaml or .yml)
        file: PathBuf,
    },
}

pub async fn cmd_workflow(args: WorkflowArgs, _ctx: &CliContext) -> Result<()> {
    match args.action {
        WorkflowAction::Validate { file } => {
            let workflow = load_workflow(&file)
                .with_context(|| format!("{} is not a valid workflow", file.display()))?;
            println!("{}", summarize(&workflow));
        }
    }
    Ok(())
}

/// Human-readable outline of a workflow
pub fn summarize(workflow: &Workflow) -> String {
    let mut out = format!(
        "Workflow '{}' ({})\n  origin: {:?}\n  actions: {}",
        workflow.name,
        workflow.id,
        workflow.metadata.origin,
        workflow.action_count()
    );
    out.push_str("\n  steps:");
    outline(&workflow.steps, 2, &mut out);

    if workflow.variables.is_empty() {
        out.push_str("\n  variables: none");
    } else {
        out.push_str("\n  variables:");
        for (name, source) in &workflow.variables {
            let source = match source {
                VariableSource::Literal { value } => format!("literal '{}'", value),
                VariableSource::Prompt {
                    per_step_confirm: true,
                } => "prompt (every use)".to_string(),
                VariableSource::Prompt { .. } => "prompt".to_string(),
                VariableSource::Clipboard => "clipboard".to_string(),
            };
            out.push_str(&format!("\n    {{{{{}}}}}: {}", name, source));
        }
    }
    out
}

fn outline(steps: &[Step], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for step in steps {
        match step {
            Step::Action(s) => {
                out.push_str(&format!("\n{}- [{}] {}", indent, s.id, s.action.describe()));
                if let Some(fallback) = &s.fallback {
                    out.push_str(&format!(" (fallback: {})", fallback.describe()));
                }
            }
            Step::Conditional(s) => {
                out.push_str(&format!("\n{}- [{}] if {}", indent, s.id, s.check));
                outline(&s.then_branch, depth + 1, out);
                if !s.else_branch.is_empty() {
                    out.push_str(&format!("\n{}  else", indent));
                    outline(&s.else_branch, depth + 1, out);
                }
            }
            Step::Loop(s) => {
                let bound = s
                    .max_iterations
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "default".to_string());
                out.push_str(&format!(
                    "\n{}- [{}] while {} (max {})",
                    indent, s.id, s.condition, bound
                ));
                outline(&s.body, depth + 1, out);
            }
        }
    }
}
