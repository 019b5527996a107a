//! Action executor
//!
//! Performs one [`Action`](action_primitives::Action) against an unstable
//! page: resolve, wait for readiness, scroll, interact, verify, and retry
//! with exponential backoff. Every attempt is reported to an
//! [`ObservationSink`]; the final result is always an [`Outcome`], never an
//! error.

mod config;
mod executor;
mod observation;
mod outcome;

pub use config::*;
pub use executor::*;
pub use observation::*;
pub use outcome::*;
