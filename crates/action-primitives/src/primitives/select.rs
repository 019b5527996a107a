//! Select primitive

use tracing::info;

use crate::{
    errors::ActionError,
    locator::{ElementHandle, PageDriver},
};

pub async fn execute_select(
    driver: &dyn PageDriver,
    element: &ElementHandle,
    option: &str,
) -> Result<String, ActionError> {
    info!(element = %element, option, "Executing select primitive");
    driver.select_option(element, option).await?;
    Ok(format!("selected '{}' in {}", option, element))
}
