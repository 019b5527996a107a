//! Workflow error types

use thiserror::Error;

/// Workflow load, store and replay errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    /// Workflow failed load-time validation; replay never starts
    #[error("Workflow schema invalid: {0}")]
    SchemaInvalid(String),

    /// Document extension is not json, yaml or yml
    #[error("Unsupported workflow format: {0}")]
    UnsupportedFormat(String),

    /// Document could not be parsed
    #[error("Workflow parse error: {0}")]
    Parse(String),

    /// Document could not be read or written
    #[error("Workflow I/O error: {0}")]
    Io(String),

    /// No workflow with that id or name
    #[error("Workflow not found: {0}")]
    NotFound(String),
}

impl FlowError {
    pub fn is_schema_invalid(&self) -> bool {
        matches!(self, FlowError::SchemaInvalid(_))
    }
}

impl From<action_primitives::ActionError> for FlowError {
    fn from(err: action_primitives::ActionError) -> Self {
        FlowError::SchemaInvalid(err.to_string())
    }
}

impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::Io(err.to_string())
    }
}

/// Variable resolution errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VariableError {
    /// No value could be obtained for the variable
    #[error("Variable '{name}' unresolved: {reason}")]
    Unresolved { name: String, reason: String },

    /// The prompt was cancelled by the user
    #[error("Variable prompt cancelled")]
    Cancelled,
}

impl VariableError {
    pub fn unresolved(name: impl Into<String>, reason: impl Into<String>) -> Self {
        VariableError::Unresolved {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
