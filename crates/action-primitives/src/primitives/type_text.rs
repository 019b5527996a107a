//! Fill and type primitives
//!
//! `fill` replaces the value in one driver call; `type` goes through the
//! driver's keystroke path (which may itself fall back to setting the value).

use tracing::info;

use crate::{
    errors::ActionError,
    locator::{ElementHandle, PageDriver},
};

pub async fn execute_fill(
    driver: &dyn PageDriver,
    element: &ElementHandle,
    text: &str,
) -> Result<String, ActionError> {
    info!(element = %element, chars = text.chars().count(), "Executing fill primitive");
    driver.set_value(element, text).await?;
    Ok(format!("filled {} ({} chars)", element, text.chars().count()))
}

pub async fn execute_type_text(
    driver: &dyn PageDriver,
    element: &ElementHandle,
    text: &str,
) -> Result<String, ActionError> {
    info!(element = %element, chars = text.chars().count(), "Executing type primitive");
    driver.type_text(element, text).await?;
    Ok(format!("typed into {} ({} chars)", element, text.chars().count()))
}
