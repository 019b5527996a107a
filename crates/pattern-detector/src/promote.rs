//! Turning a confirmed candidate into a workflow

use std::collections::HashSet;

use action_flow::{
    validate_workflow, Step, VariableBindings, VariableSource, Workflow, WorkflowMetadata,
};
use action_primitives::{template, Action, TargetSpec};
use tracing::info;

use crate::detector::PatternCandidate;
use crate::errors::DetectorError;

const MAX_NAME_LEN: usize = 32;

/// A promoted workflow plus bindings reproducing the latest occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct PromotedWorkflow {
    pub workflow: Workflow,
    pub bindings: VariableBindings,
}

/// Build a workflow from the candidate's most recent occurrence
///
/// Every literal payload becomes a `prompt` variable named after its target;
/// the literals themselves are returned as bindings.
pub fn promote(candidate: &PatternCandidate, name: &str) -> Result<PromotedWorkflow, DetectorError> {
    if candidate.latest.is_empty() {
        return Err(DetectorError::EmptyCandidate);
    }

    let mut taken = HashSet::new();
    let mut bindings = VariableBindings::new();
    let mut steps = Vec::with_capacity(candidate.latest.len());
    let mut variables = Vec::new();

    for (index, observed) in candidate.latest.iter().enumerate() {
        let mut action: Action = observed.clone();
        if action.kind.requires_payload() {
            if let Some(literal) = action.payload.take() {
                let variable = unique_name(&mut taken, &variable_stem(&action));
                action.payload = Some(template::placeholder(&variable));
                bindings.insert(variable.clone(), literal);
                variables.push(variable);
            }
        }
        steps.push(Step::action(format!("step-{}", index + 1), action));
    }

    let mut workflow = Workflow::new(name, steps)
        .with_description(format!(
            "Detected after {} repetitions: {}",
            candidate.occurrence_count,
            candidate.describe()
        ))
        .with_metadata(WorkflowMetadata::detected(candidate.occurrence_count));
    for variable in variables {
        workflow = workflow.with_variable(variable, VariableSource::prompt());
    }
    validate_workflow(&workflow)?;

    info!(
        workflow_id = %workflow.id,
        name = %workflow.name,
        variables = workflow.variables.len(),
        "Promoted pattern to workflow"
    );
    Ok(PromotedWorkflow { workflow, bindings })
}

fn variable_stem(action: &Action) -> String {
    let source = match &action.target {
        None => "url".to_string(),
        Some(TargetSpec::Label(label)) => label.clone(),
        Some(TargetSpec::Text(t)) => t.text.clone(),
        Some(TargetSpec::Css(css)) => css.clone(),
        Some(TargetSpec::XPath(xpath)) => xpath.rsplit('/').next().unwrap_or_default().to_string(),
        Some(TargetSpec::Index(index)) => index
            .identity
            .as_ref()
            .map(|identity| identity.stable_attr.clone())
            .unwrap_or_else(|| index.category.name().to_string()),
    };
    slug(&source)
}

/// Lowercase identifier usable as a placeholder name
fn slug(source: &str) -> String {
    let mut out = String::new();
    for ch in source.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
        if out.len() >= MAX_NAME_LEN {
            break;
        }
    }
    let out = out.trim_end_matches('_');
    match out.chars().next() {
        None => "value".to_string(),
        Some(first) if first.is_ascii_digit() => format!("v_{}", out),
        Some(_) => out.to_string(),
    }
}

fn unique_name(taken: &mut HashSet<String>, stem: &str) -> String {
    let mut name = stem.to_string();
    let mut suffix = 2;
    while !taken.insert(name.clone()) {
        name = format!("{}_{}", stem, suffix);
        suffix += 1;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::testing::observation;
    use action_flow::WorkflowOrigin;
    use chrono::Utc;

    fn candidate(latest: Vec<Action>) -> PatternCandidate {
        let sequence = latest
            .iter()
            .map(|a| normalize(&observation(a.clone())).unwrap())
            .collect();
        PatternCandidate {
            sequence,
            occurrence_count: 3,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            latest,
        }
    }

    #[test]
    fn test_literals_become_prompt_variables() {
        let promoted = promote(
            &candidate(vec![
                Action::navigate("https://shop.test/new"),
                Action::fill(TargetSpec::label("Product name"), "Lamp"),
                Action::fill(TargetSpec::css("#price"), "19.99"),
                Action::click(TargetSpec::text("Save")),
            ]),
            "add-product",
        )
        .unwrap();

        let workflow = &promoted.workflow;
        assert_eq!(workflow.metadata.origin, WorkflowOrigin::DetectedPattern);
        assert_eq!(workflow.metadata.repetition_count, Some(3));
        assert_eq!(
            workflow.variables.keys().cloned().collect::<Vec<_>>(),
            vec!["price", "product_name", "url"]
        );
        assert_eq!(promoted.bindings["product_name"], "Lamp");
        assert_eq!(promoted.bindings["url"], "https://shop.test/new");
        assert!(workflow
            .variables
            .values()
            .all(|source| *source == VariableSource::prompt()));
    }

    #[test]
    fn test_duplicate_names_get_suffixes() {
        let promoted = promote(
            &candidate(vec![
                Action::fill(TargetSpec::label("Email"), "a@b.com"),
                Action::fill(TargetSpec::label("Email"), "c@d.com"),
            ]),
            "emails",
        )
        .unwrap();
        assert_eq!(promoted.bindings["email"], "a@b.com");
        assert_eq!(promoted.bindings["email_2"], "c@d.com");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("#user-email"), "user_email");
        assert_eq!(slug("2nd Address"), "v_2nd_address");
        assert_eq!(slug("!!!"), "value");
    }

    #[test]
    fn test_empty_candidate_rejected() {
        assert_eq!(
            promote(&candidate(vec![]), "empty"),
            Err(DetectorError::EmptyCandidate)
        );
    }
}
