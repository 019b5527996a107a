//! Single-shot evaluation of verification rules

use action_primitives::{DriverError, PageDriver, VerifyRule};
use tracing::debug;

use crate::{errors::GateError, types::ValidationContext};

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionCheck {
    pub holds: bool,
    pub reason: String,
}

impl ConditionCheck {
    fn holds(reason: impl Into<String>) -> Self {
        Self {
            holds: true,
            reason: reason.into(),
        }
    }

    fn fails(reason: impl Into<String>) -> Self {
        Self {
            holds: false,
            reason: reason.into(),
        }
    }
}

/// Evaluate `rule` once against the current page
///
/// Detached elements count as "not holding yet" rather than as errors, since
/// the page may still be re-rendering.
pub async fn evaluate_rule(
    driver: &dyn PageDriver,
    rule: &VerifyRule,
    context: &ValidationContext,
) -> Result<ConditionCheck, GateError> {
    let target = context.target.as_ref().ok_or_else(|| {
        GateError::InvalidSpec(format!("'{}' needs a target to re-resolve", rule.name()))
    })?;

    let handles = driver.resolve(target).await?;
    debug!(rule = rule.name(), target = %target, matches = handles.len(), "evaluating rule");

    let expected = match rule {
        VerifyRule::ElementAbsent => {
            return Ok(if handles.is_empty() {
                ConditionCheck::holds(format!("{} is absent", target))
            } else {
                ConditionCheck::fails(format!("{} is still present", target))
            });
        }
        VerifyRule::ElementPresent => {
            return Ok(if handles.is_empty() {
                ConditionCheck::fails(format!("{} is not present", target))
            } else {
                ConditionCheck::holds(format!("{} is present", target))
            });
        }
        VerifyRule::ElementVisible => {
            let Some(first) = handles.first() else {
                return Ok(ConditionCheck::fails(format!("{} is not present", target)));
            };
            return Ok(match driver.is_visible(first).await {
                Ok(true) => ConditionCheck::holds(format!("{} is visible", target)),
                Ok(false) => ConditionCheck::fails(format!("{} is not visible", target)),
                Err(DriverError::Detached(_)) => {
                    ConditionCheck::fails(format!("{} detached while checking", target))
                }
                Err(err) => return Err(err.into()),
            });
        }
        VerifyRule::ValueEqualsPayload => context.payload.clone().ok_or_else(|| {
            GateError::InvalidSpec("value_equals_payload without a payload".to_string())
        })?,
        VerifyRule::ValueEquals(value) => value.clone(),
    };

    let Some(first) = handles.first() else {
        return Ok(ConditionCheck::fails(format!("{} is not present", target)));
    };
    match driver.read_value(first).await {
        Ok(Some(actual)) if actual == expected => {
            Ok(ConditionCheck::holds(format!("value is '{}'", actual)))
        }
        Ok(Some(actual)) => Ok(ConditionCheck::fails(format!(
            "value is '{}', expected '{}'",
            actual, expected
        ))),
        Ok(None) => Ok(ConditionCheck::fails(format!(
            "{} has no readable value",
            target
        ))),
        Err(DriverError::Detached(_)) => Ok(ConditionCheck::fails(format!(
            "{} detached while reading value",
            target
        ))),
        Err(err) => Err(err.into()),
    }
}
