//! Navigate primitive

use tracing::info;

use crate::{errors::ActionError, locator::PageDriver};

/// Prefix scheme-less URLs with `https://`
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

pub async fn execute_navigate(driver: &dyn PageDriver, url: &str) -> Result<String, ActionError> {
    let url = normalize_url(url);
    info!(url = %url, "Executing navigate primitive");
    driver.navigate(&url).await?;
    Ok(format!("navigated to {}", url))
}
