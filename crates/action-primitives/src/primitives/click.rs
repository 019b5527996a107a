//! Click primitive

use tracing::info;

use crate::{
    errors::ActionError,
    locator::{ElementHandle, PageDriver},
};

pub async fn execute_click(
    driver: &dyn PageDriver,
    element: &ElementHandle,
) -> Result<String, ActionError> {
    info!(element = %element, "Executing click primitive");
    driver.click(element).await?;
    Ok(format!("clicked {}", element))
}
