use action_flow::FlowError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectorError {
    #[error("invalid detector config: {0}")]
    InvalidConfig(String),

    #[error("candidate has no actions")]
    EmptyCandidate,

    #[error("unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("promoted workflow is invalid: {0}")]
    Workflow(#[from] FlowError),
}
