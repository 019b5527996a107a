//! Observation log and pattern detection
//!
//! The executor appends every attempt to an [`ObservationLog`]; the
//! [`PatternDetector`] scans its recent window for action sequences that
//! repeat with different literal data and offers them for promotion into a
//! workflow.

mod config;
mod detector;
mod errors;
mod log;
mod normalize;
mod promote;

#[cfg(test)]
mod testing;

pub use config::{DetectorConfig, MAX_SEQUENCE_LEN};
pub use detector::{PatternCandidate, PatternDetector};
pub use errors::DetectorError;
pub use log::ObservationLog;
pub use normalize::{is_detectable, normalize, NormalizedAction, NormalizedTarget};
pub use promote::{promote, PromotedWorkflow};
