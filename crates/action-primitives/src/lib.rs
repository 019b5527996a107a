//! Action model and interaction primitives
//!
//! This crate provides the building blocks the executor composes:
//! - The declarative [`Action`] with its targeting spec, payload, verification
//!   rule and error policy
//! - The [`PageDriver`] boundary the host browser adapter implements
//! - Readiness waiting (visible and geometrically stable)
//! - The fixed dispatch table of interaction primitives
//! - Page scans that produce index targets

pub mod errors;
mod clock;
mod locator;
mod primitives;
mod scan;
pub mod template;
pub mod types;
mod waiting;

#[cfg(any(test, feature = "stub"))]
pub mod stub;

pub use clock::*;
pub use errors::*;
pub use locator::*;
pub use primitives::*;
pub use scan::*;
pub use types::*;
pub use waiting::*;
