//! Page element scan
//!
//! Lists the interactive elements of a page by category so that index
//! targets can be built from a stable snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::errors::{ActionError, DriverError};
use crate::locator::{ElementDescription, ElementHandle, PageDriver};
use crate::types::{ElementCategory, IndexTarget, TargetSpec};

const LABEL_TEXT_LIMIT: usize = 50;

/// Default number of entries rendered per category
pub const DEFAULT_RENDER_LIMIT: usize = 20;

/// One scanned element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedElement {
    pub index: usize,
    pub handle: ElementHandle,

    /// `None` when the element could not be described
    pub description: Option<ElementDescription>,
}

impl ScannedElement {
    /// Display label: text, then name, id, placeholder
    pub fn label(&self) -> String {
        let Some(desc) = &self.description else {
            return "(could not read)".to_string();
        };
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(text) = non_empty(&desc.text) {
            return format!("'{}'", text.chars().take(LABEL_TEXT_LIMIT).collect::<String>());
        }
        if let Some(name) = non_empty(&desc.name) {
            return format!("name='{}'", name);
        }
        if let Some(id) = non_empty(&desc.id) {
            return format!("id='{}'", id);
        }
        if let Some(placeholder) = non_empty(&desc.placeholder) {
            return format!("placeholder='{}'", placeholder);
        }
        "(no label)".to_string()
    }
}

/// Snapshot of the page's interactive elements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageScan {
    pub categories: BTreeMap<ElementCategory, Vec<ScannedElement>>,
}

impl PageScan {
    pub fn elements(&self, category: ElementCategory) -> &[ScannedElement] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Index target for `category[index]`, carrying the element's identity
    pub fn target(&self, category: ElementCategory, index: usize) -> Result<TargetSpec, ActionError> {
        let elements = self.elements(category);
        let element = elements.get(index).ok_or(ActionError::IndexOutOfRange {
            category,
            index,
            len: elements.len(),
        })?;
        Ok(TargetSpec::Index(IndexTarget {
            category,
            index,
            identity: element.description.as_ref().and_then(|d| d.identity()),
        }))
    }

    /// Human-readable listing, at most `limit` entries per category
    pub fn render(&self, limit: usize) -> String {
        let mut out = String::new();
        for category in ElementCategory::all() {
            let elements = self.elements(category);
            out.push_str(&format!(
                "\n{} ({} found):\n",
                category.name().to_uppercase(),
                elements.len()
            ));
            for element in elements.iter().take(limit) {
                out.push_str(&format!("  [{}] {}\n", element.index, element.label()));
            }
            if elements.len() > limit {
                out.push_str(&format!("  ... and {} more\n", elements.len() - limit));
            }
        }
        out
    }
}

/// Scan every element category on the page
pub async fn scan_page(driver: &dyn PageDriver) -> Result<PageScan, DriverError> {
    info!("Scanning page for interactive elements");
    let mut scan = PageScan::default();

    for category in ElementCategory::all() {
        let handles = driver
            .resolve(&TargetSpec::css(category.selector()))
            .await?;
        let mut elements = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let description = match driver.describe(&handle).await {
                Ok(desc) => Some(desc),
                Err(err) => {
                    debug!(element = %handle, "could not describe element: {}", err);
                    None
                }
            };
            elements.push(ScannedElement {
                index,
                handle,
                description,
            });
        }
        debug!(category = %category, count = elements.len(), "scanned category");
        scan.categories.insert(category, elements);
    }

    Ok(scan)
}
