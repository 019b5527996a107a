//! Core data types for the action model

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::time::Duration;

use crate::errors::ActionError;
use crate::template;

/// Intended interaction kind
///
/// The five interacting kinds (click, fill, type, select, navigate) each map to one
/// entry of the dispatch table in [`crate::primitives`]; `wait` and `assert` only
/// resolve and observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Fill,
    Type,
    Select,
    Navigate,
    Wait,
    Assert,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Navigate => "navigate",
            ActionKind::Wait => "wait",
            ActionKind::Assert => "assert",
        }
    }

    /// Kinds that write a value
    pub fn requires_payload(&self) -> bool {
        matches!(
            self,
            ActionKind::Fill | ActionKind::Type | ActionKind::Select | ActionKind::Navigate
        )
    }

    /// Every kind except navigate acts on an element
    pub fn requires_target(&self) -> bool {
        !matches!(self, ActionKind::Navigate)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interactive element categories produced by a page scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementCategory {
    Buttons,
    Links,
    Inputs,
    Textareas,
    Selects,
    Checkboxes,
    Radios,
}

impl ElementCategory {
    /// Scan order
    pub fn all() -> [ElementCategory; 7] {
        [
            ElementCategory::Buttons,
            ElementCategory::Links,
            ElementCategory::Inputs,
            ElementCategory::Textareas,
            ElementCategory::Selects,
            ElementCategory::Checkboxes,
            ElementCategory::Radios,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementCategory::Buttons => "buttons",
            ElementCategory::Links => "links",
            ElementCategory::Inputs => "inputs",
            ElementCategory::Textareas => "textareas",
            ElementCategory::Selects => "selects",
            ElementCategory::Checkboxes => "checkboxes",
            ElementCategory::Radios => "radios",
        }
    }

    /// CSS query matching every element of this category
    pub fn selector(&self) -> &'static str {
        match self {
            ElementCategory::Buttons => {
                r#"button, input[type="button"], input[type="submit"]"#
            }
            ElementCategory::Links => "a[href]",
            ElementCategory::Inputs => {
                r#"input[type="text"], input[type="email"], input[type="password"]"#
            }
            ElementCategory::Textareas => "textarea",
            ElementCategory::Selects => "select",
            ElementCategory::Checkboxes => r#"input[type="checkbox"]"#,
            ElementCategory::Radios => r#"input[type="radio"]"#,
        }
    }
}

impl fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable identity of an element, independent of its position in a scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementIdentity {
    /// ARIA role or tag name
    pub role: String,

    /// First available of id, name, placeholder, visible text
    pub stable_attr: String,
}

/// Index into a prior page scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexTarget {
    pub category: ElementCategory,
    pub index: usize,

    /// Identity captured at scan time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ElementIdentity>,
}

/// Visible-text match with an optional element-type filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextTarget {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<ElementCategory>,
}

/// Targeting spec - exactly one strategy per action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TargetFields", into = "TargetFields")]
pub enum TargetSpec {
    /// Index into a prior scan
    Index(IndexTarget),

    /// Visible text
    Text(TextTarget),

    /// Label or placeholder text
    Label(String),

    /// CSS selector
    Css(String),

    /// XPath expression
    XPath(String),
}

impl TargetSpec {
    pub fn text(text: impl Into<String>) -> Self {
        TargetSpec::Text(TextTarget {
            text: text.into(),
            element_type: None,
        })
    }

    pub fn text_of(text: impl Into<String>, element_type: ElementCategory) -> Self {
        TargetSpec::Text(TextTarget {
            text: text.into(),
            element_type: Some(element_type),
        })
    }

    pub fn label(label: impl Into<String>) -> Self {
        TargetSpec::Label(label.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        TargetSpec::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        TargetSpec::XPath(expr.into())
    }

    pub fn index(category: ElementCategory, index: usize) -> Self {
        TargetSpec::Index(IndexTarget {
            category,
            index,
            identity: None,
        })
    }

    /// Strategy name
    pub fn strategy(&self) -> &'static str {
        match self {
            TargetSpec::Index(_) => "index",
            TargetSpec::Text(_) => "text",
            TargetSpec::Label(_) => "label",
            TargetSpec::Css(_) => "css",
            TargetSpec::XPath(_) => "xpath",
        }
    }

    /// Index-free strategies must resolve to exactly one element
    pub fn requires_unique(&self) -> bool {
        !matches!(self, TargetSpec::Index(_))
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Index(t) => write!(f, "index:{}[{}]", t.category, t.index),
            TargetSpec::Text(t) => match t.element_type {
                Some(kind) => write!(f, "text:{}:'{}'", kind, t.text),
                None => write!(f, "text:'{}'", t.text),
            },
            TargetSpec::Label(s) => write!(f, "label:'{}'", s),
            TargetSpec::Css(s) => write!(f, "css:{}", s),
            TargetSpec::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// Persisted form of a [`TargetSpec`]: one optional field per strategy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

impl TryFrom<TargetFields> for TargetSpec {
    type Error = ActionError;

    fn try_from(fields: TargetFields) -> Result<Self, Self::Error> {
        let mut selected = Vec::with_capacity(1);
        if let Some(index) = fields.index {
            selected.push(TargetSpec::Index(index));
        }
        if let Some(text) = fields.text {
            selected.push(TargetSpec::Text(text));
        }
        if let Some(label) = fields.label {
            selected.push(TargetSpec::Label(label));
        }
        if let Some(css) = fields.css {
            selected.push(TargetSpec::Css(css));
        }
        if let Some(xpath) = fields.xpath {
            selected.push(TargetSpec::XPath(xpath));
        }

        if selected.len() != 1 {
            return Err(ActionError::InvalidTarget(format!(
                "exactly one targeting strategy must be selected, found {}",
                selected.len()
            )));
        }
        let spec = selected.remove(0);

        let empty = match &spec {
            TargetSpec::Index(_) => false,
            TargetSpec::Text(t) => t.text.trim().is_empty(),
            TargetSpec::Label(s) | TargetSpec::Css(s) | TargetSpec::XPath(s) => s.trim().is_empty(),
        };
        if empty {
            return Err(ActionError::InvalidTarget(format!(
                "{} strategy has an empty value",
                spec.strategy()
            )));
        }

        Ok(spec)
    }
}

impl From<TargetSpec> for TargetFields {
    fn from(spec: TargetSpec) -> Self {
        let mut fields = TargetFields::default();
        match spec {
            TargetSpec::Index(t) => fields.index = Some(t),
            TargetSpec::Text(t) => fields.text = Some(t),
            TargetSpec::Label(s) => fields.label = Some(s),
            TargetSpec::Css(s) => fields.css = Some(s),
            TargetSpec::XPath(s) => fields.xpath = Some(s),
        }
        fields
    }
}

/// What to do once every attempt has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    /// Surface the failure; a replay stops
    Abort,

    /// Report success with a skipped marker
    Skip,

    /// Run the caller-supplied alternate action once
    Fallback,
}

impl Default for Exhaustion {
    fn default() -> Self {
        Exhaustion::Abort
    }
}

pub const MAX_RETRIES_LIMIT: u32 = 100;
pub const MAX_INITIAL_DELAY_MS: u64 = 600_000;

/// Per-action retry and exhaustion policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,

    /// Delay after the first failed attempt
    pub initial_delay_ms: u64,

    /// Growth factor applied per failed attempt
    pub backoff_multiplier: f64,

    pub on_exhaustion: Exhaustion,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 250,
            backoff_multiplier: 2.0,
            on_exhaustion: Exhaustion::Abort,
        }
    }
}

impl ErrorPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay_ms: u64,
        backoff_multiplier: f64,
        on_exhaustion: Exhaustion,
    ) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            backoff_multiplier,
            on_exhaustion,
        }
    }

    /// Policy with no retries that surfaces the first failure
    pub fn no_retry() -> Self {
        Self::new(0, 0, 1.0, Exhaustion::Abort)
    }

    pub fn with_exhaustion(mut self, on_exhaustion: Exhaustion) -> Self {
        self.on_exhaustion = on_exhaustion;
        self
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (0-indexed): `initial × multiplier^attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        if millis.is_nan() || millis <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_millis(millis.min(u64::MAX as f64).round() as u64)
    }

    pub fn validate(&self) -> Result<(), ActionError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(ActionError::InvalidPolicy(format!(
                "backoff_multiplier must be a positive number, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ActionError::InvalidPolicy(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }
        if self.initial_delay_ms > MAX_INITIAL_DELAY_MS {
            return Err(ActionError::InvalidPolicy(format!(
                "initial_delay_ms must be at most {}, got {}",
                MAX_INITIAL_DELAY_MS, self.initial_delay_ms
            )));
        }
        Ok(())
    }
}

/// Post-condition checked after the interaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "value")]
pub enum VerifyRule {
    /// Element value equals the (substituted) payload
    ValueEqualsPayload,

    /// Element value equals a fixed string
    ValueEquals(String),

    /// Target no longer resolves
    ElementAbsent,

    /// Target still resolves
    ElementPresent,

    /// Target resolves and is visible
    ElementVisible,
}

impl VerifyRule {
    pub fn name(&self) -> &'static str {
        match self {
            VerifyRule::ValueEqualsPayload => "value_equals_payload",
            VerifyRule::ValueEquals(_) => "value_equals",
            VerifyRule::ElementAbsent => "element_absent",
            VerifyRule::ElementPresent => "element_present",
            VerifyRule::ElementVisible => "element_visible",
        }
    }
}

/// One intended interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetSpec>,

    /// Value to write; may contain `{{name}}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyRule>,

    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl Action {
    fn build(kind: ActionKind, target: Option<TargetSpec>, payload: Option<String>) -> Self {
        Self {
            kind,
            target,
            payload,
            verify: None,
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn click(target: TargetSpec) -> Self {
        Self::build(ActionKind::Click, Some(target), None)
    }

    pub fn fill(target: TargetSpec, value: impl Into<String>) -> Self {
        Self::build(ActionKind::Fill, Some(target), Some(value.into()))
    }

    pub fn type_text(target: TargetSpec, text: impl Into<String>) -> Self {
        Self::build(ActionKind::Type, Some(target), Some(text.into()))
    }

    pub fn select(target: TargetSpec, option: impl Into<String>) -> Self {
        Self::build(ActionKind::Select, Some(target), Some(option.into()))
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::build(ActionKind::Navigate, None, Some(url.into()))
    }

    pub fn wait(target: TargetSpec) -> Self {
        Self::build(ActionKind::Wait, Some(target), None)
    }

    pub fn assert(target: TargetSpec, rule: VerifyRule) -> Self {
        Self::build(ActionKind::Assert, Some(target), None).with_verify(rule)
    }

    pub fn with_verify(mut self, rule: VerifyRule) -> Self {
        self.verify = Some(rule);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Placeholder names referenced by the payload, in order of appearance
    pub fn placeholders(&self) -> Vec<String> {
        self.payload
            .as_deref()
            .map(template::placeholders)
            .unwrap_or_default()
    }

    /// Check the payload/target invariants and the error policy
    pub fn validate(&self) -> Result<(), ActionError> {
        match (self.kind.requires_payload(), self.payload.is_some()) {
            (true, false) => return Err(ActionError::MissingPayload(self.kind)),
            (false, true) => return Err(ActionError::UnexpectedPayload(self.kind)),
            _ => {}
        }

        if self.kind.requires_target() && self.target.is_none() {
            return Err(ActionError::MissingTarget(self.kind));
        }

        if let Some(rule) = &self.verify {
            if self.target.is_none() {
                return Err(ActionError::InvalidVerify(format!(
                    "'{}' needs a target to re-resolve",
                    rule.name()
                )));
            }
            if matches!(rule, VerifyRule::ValueEqualsPayload) && self.payload.is_none() {
                return Err(ActionError::InvalidVerify(
                    "value_equals_payload on an action without payload".to_string(),
                ));
            }
        }

        self.error_policy.validate()
    }

    /// Short human-readable description for logs and reports
    pub fn describe(&self) -> String {
        match (&self.target, &self.payload) {
            (Some(target), Some(payload)) => format!("{} {} <- '{}'", self.kind, target, payload),
            (Some(target), None) => format!("{} {}", self.kind, target),
            (None, Some(payload)) => format!("{} '{}'", self.kind, payload),
            (None, None) => self.kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_invariant() {
        let mut action = Action::fill(TargetSpec::label("Email"), "a@b.com");
        assert!(action.validate().is_ok());

        action.payload = None;
        assert_eq!(
            action.validate(),
            Err(ActionError::MissingPayload(ActionKind::Fill))
        );

        let mut click = Action::click(TargetSpec::css("#go"));
        click.payload = Some("x".into());
        assert_eq!(
            click.validate(),
            Err(ActionError::UnexpectedPayload(ActionKind::Click))
        );
    }

    #[test]
    fn test_target_invariant() {
        assert!(Action::navigate("example.com").validate().is_ok());

        let mut wait = Action::wait(TargetSpec::css("#spinner"));
        wait.target = None;
        assert_eq!(
            wait.validate(),
            Err(ActionError::MissingTarget(ActionKind::Wait))
        );
    }

    #[test]
    fn test_target_fields_require_exactly_one_strategy() {
        let none: Result<TargetSpec, _> = TargetSpec::try_from(TargetFields::default());
        assert!(none.is_err());

        let two = TargetFields {
            css: Some("#a".into()),
            label: Some("A".into()),
            ..Default::default()
        };
        assert!(TargetSpec::try_from(two).is_err());

        let empty = TargetFields {
            css: Some("  ".into()),
            ..Default::default()
        };
        assert!(TargetSpec::try_from(empty).is_err());

        let one = TargetFields {
            label: Some("Email".into()),
            ..Default::default()
        };
        assert_eq!(TargetSpec::try_from(one).unwrap(), TargetSpec::label("Email"));
    }

    #[test]
    fn test_target_serde_shape() {
        let json = serde_json::to_value(TargetSpec::text_of("Submit", ElementCategory::Buttons))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"text": {"text": "Submit", "element_type": "buttons"}})
        );

        let parsed: TargetSpec = serde_json::from_value(serde_json::json!({"css": "#go"})).unwrap();
        assert_eq!(parsed, TargetSpec::css("#go"));

        let rejected: Result<TargetSpec, _> = serde_json::from_value(serde_json::json!({}));
        assert!(rejected.is_err());
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = ErrorPolicy::new(4, 100, 2.0, Exhaustion::Abort);
        let delays: Vec<u64> = (0..4)
            .map(|i| policy.delay_for_attempt(i).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        assert_eq!(policy.max_attempts(), 5);

        let flat = ErrorPolicy::new(3, 50, 1.0, Exhaustion::Skip);
        assert_eq!(flat.delay_for_attempt(3), Duration::from_millis(50));
    }

    #[test]
    fn test_policy_validation() {
        assert!(ErrorPolicy::default().validate().is_ok());
        assert!(ErrorPolicy::new(1, 10, f64::NAN, Exhaustion::Abort)
            .validate()
            .is_err());
        assert!(ErrorPolicy::new(1, 10, -1.0, Exhaustion::Abort)
            .validate()
            .is_err());
        assert!(ErrorPolicy::new(MAX_RETRIES_LIMIT + 1, 10, 2.0, Exhaustion::Abort)
            .validate()
            .is_err());
    }

    #[test]
    fn test_value_equals_payload_needs_payload() {
        let action = Action::click(TargetSpec::css("#go")).with_verify(VerifyRule::ValueEqualsPayload);
        assert!(matches!(
            action.validate(),
            Err(ActionError::InvalidVerify(_))
        ));
    }

    #[test]
    fn test_placeholders() {
        let action = Action::fill(TargetSpec::label("Name"), "{{first}} {{ last }}");
        assert_eq!(action.placeholders(), vec!["first", "last"]);
    }
}
