//! Workflow orchestration layer
//!
//! Workflows are named, parameterised step programs: actions, conditionals
//! over a zero-side-effect probe, and bounded loops. This crate validates
//! their persisted form, resolves their variables and replays them through
//! the [`ActionExecutor`](action_executor::ActionExecutor).

pub mod errors;
pub mod executor;
pub mod schema;
pub mod store;
pub mod strategies;
pub mod types;
pub mod variables;

pub use errors::{FlowError, VariableError};
pub use executor::{FlowExecutor, ReplayEngine};
pub use schema::{load_workflow, save_workflow, validate_workflow, WorkflowFormat};
pub use store::WorkflowStore;
pub use strategies::{DefaultFailureHandler, FailureHandler, FailureHandlerResult};
pub use types::*;
pub use variables::{
    ResolvedVariables, StaticVariables, VariableBindings, VariableProvider,
};
