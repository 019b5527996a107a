//! Error types for gate validation

use action_primitives::DriverError;
use thiserror::Error;

/// Gate validation error enumeration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    /// Rule cannot be evaluated in this context
    #[error("Invalid verification rule: {0}")]
    InvalidSpec(String),

    /// Cancel signal observed inside the settle window
    #[error("Validation cancelled")]
    Cancelled,

    /// Driver call failed in a way polling cannot recover from
    #[error(transparent)]
    Driver(#[from] DriverError),
}
