//! Payload-free comparison keys for observed actions

use std::fmt;

use action_executor::Observation;
use action_primitives::{ActionKind, ElementCategory, ElementIdentity, TargetSpec};
use serde::{Deserialize, Serialize};

/// Target as compared by the detector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum NormalizedTarget {
    /// Navigation has no element target
    Page,
    Text {
        text: String,
        element_type: Option<ElementCategory>,
    },
    Label(String),
    Css(String),
    XPath(String),
    /// Index targets compare by the element they resolved to, not the index
    Identity(ElementIdentity),
}

impl fmt::Display for NormalizedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedTarget::Page => f.write_str("page"),
            NormalizedTarget::Text { text, .. } => write!(f, "text:'{}'", text),
            NormalizedTarget::Label(label) => write!(f, "label:'{}'", label),
            NormalizedTarget::Css(css) => write!(f, "css:{}", css),
            NormalizedTarget::XPath(xpath) => write!(f, "xpath:{}", xpath),
            NormalizedTarget::Identity(identity) => {
                write!(f, "{}:'{}'", identity.role, identity.stable_attr)
            }
        }
    }
}

/// Action with its payload erased
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedAction {
    pub kind: ActionKind,
    pub target: NormalizedTarget,
}

impl fmt::Display for NormalizedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)
    }
}

/// Comparison key for an observation
///
/// `None` means the observation can never be part of a match: an index
/// target whose element identity is unknown.
pub fn normalize(observation: &Observation) -> Option<NormalizedAction> {
    let target = match &observation.action.target {
        None => NormalizedTarget::Page,
        Some(TargetSpec::Text(t)) => NormalizedTarget::Text {
            text: t.text.clone(),
            element_type: t.element_type,
        },
        Some(TargetSpec::Label(label)) => NormalizedTarget::Label(label.clone()),
        Some(TargetSpec::Css(css)) => NormalizedTarget::Css(css.clone()),
        Some(TargetSpec::XPath(xpath)) => NormalizedTarget::XPath(xpath.clone()),
        Some(TargetSpec::Index(index)) => {
            let identity = observation
                .resolved_identity
                .clone()
                .or_else(|| index.identity.clone())?;
            NormalizedTarget::Identity(identity)
        }
    };
    Some(NormalizedAction {
        kind: observation.action.kind,
        target,
    })
}

/// Whether an observation is eligible for detection at all
pub fn is_detectable(observation: &Observation) -> bool {
    observation.outcome.is_success()
}

/// `sequence` is a whole repetition of a strictly shorter unit
pub fn is_periodic(sequence: &[NormalizedAction]) -> bool {
    let len = sequence.len();
    (1..len)
        .filter(|unit| len % unit == 0)
        .any(|unit| (unit..len).all(|i| sequence[i] == sequence[i - unit]))
}

/// `sequence` lies within the endless repetition of `unit`
///
/// Covers rotations (`[B, A]` of `[A, B]`), partial runs (`[A, B, A]`) and
/// contiguous slices of a longer unit.
pub fn covered_by(sequence: &[NormalizedAction], unit: &[NormalizedAction]) -> bool {
    if unit.is_empty() || sequence.is_empty() {
        return false;
    }
    (0..unit.len()).any(|offset| {
        sequence
            .iter()
            .enumerate()
            .all(|(i, action)| *action == unit[(offset + i) % unit.len()])
    })
}
