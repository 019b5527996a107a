//! Pagewright: adaptive web automation
//!
//! Reliable single actions against unstable pages, detection of repeated
//! action sequences, and replay of parameterised workflows. The engine
//! crates are re-exported here together with the session facade, the
//! versioned configuration and the `pagewright` command line.

pub mod cli;
pub mod config;
pub mod errors;
pub mod session;
pub mod signals;

pub use config::{BrowserProfile, EngineConfig, SessionPreferences, CONFIG_VERSION};
pub use errors::{ConfigError, SessionError};
pub use session::AutomationSession;
pub use signals::{ControlSignal, RunTokens, SignalRouter};

pub use action_executor;
pub use action_flow;
pub use action_gate;
pub use action_primitives;
pub use pattern_detector;
