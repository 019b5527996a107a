//! Post-condition gate
//!
//! After an interaction the executor asks the gate whether the action's
//! [`VerifyRule`](action_primitives::VerifyRule) holds. Rules are re-evaluated
//! until they pass or the settle window closes, so pages that update
//! asynchronously are not reported as failures too early.

pub mod conditions;
pub mod errors;
pub mod types;
pub mod validator;

pub use conditions::*;
pub use errors::*;
pub use types::*;
pub use validator::*;
