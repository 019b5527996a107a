//! Interaction primitives
//!
//! Fixed dispatch table over the interacting kinds:
//! 1. click - Click the resolved element
//! 2. fill - Replace the element value
//! 3. type - Enter text as keystrokes
//! 4. select - Choose a dropdown option
//! 5. navigate - Load a URL
//!
//! `wait` and `assert` resolve and observe only, so they dispatch to a no-op.

mod click;
mod navigate;
mod select;
mod type_text;

pub use click::*;
pub use navigate::*;
pub use select::*;
pub use type_text::*;

use tracing::debug;

use crate::{
    errors::{ActionError, DriverError},
    locator::{ElementHandle, PageDriver},
    types::ActionKind,
};

/// Perform the kind-specific interaction and return a short detail string
pub async fn perform(
    driver: &dyn PageDriver,
    kind: ActionKind,
    element: Option<&ElementHandle>,
    payload: Option<&str>,
) -> Result<String, ActionError> {
    let element_for = |kind: ActionKind| element.ok_or(ActionError::MissingTarget(kind));
    let payload_for = |kind: ActionKind| payload.ok_or(ActionError::MissingPayload(kind));

    match kind {
        ActionKind::Click => execute_click(driver, element_for(kind)?).await,
        ActionKind::Fill => execute_fill(driver, element_for(kind)?, payload_for(kind)?).await,
        ActionKind::Type => {
            execute_type_text(driver, element_for(kind)?, payload_for(kind)?).await
        }
        ActionKind::Select => {
            execute_select(driver, element_for(kind)?, payload_for(kind)?).await
        }
        ActionKind::Navigate => execute_navigate(driver, payload_for(kind)?).await,
        ActionKind::Wait | ActionKind::Assert => {
            debug!(kind = %kind, "no interaction for observing kind");
            Ok(match element {
                Some(el) => format!("{} ready", el),
                None => "ready".to_string(),
            })
        }
    }
}

/// Scroll `element` into view when its box is not fully inside the viewport
///
/// Returns whether a scroll happened.
pub async fn ensure_in_viewport(
    driver: &dyn PageDriver,
    element: &ElementHandle,
    bbox: &crate::locator::BoundingBox,
) -> Result<bool, DriverError> {
    let viewport = driver.viewport().await?;
    if viewport.contains(bbox) {
        return Ok(false);
    }
    debug!(element = %element, "scrolling element into view");
    driver.scroll_into_view(element).await?;
    Ok(true)
}
