//! Locator abstraction - the narrow interface the browser driver provides
//!
//! The core never talks to a browser directly. A host adapter implements
//! [`PageDriver`] for one live page; every operation may fail with a
//! [`DriverError`], which the executor maps onto its failure kinds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{DriverError, FailureKind};
use crate::types::{ElementIdentity, TargetSpec};

/// Opaque reference to a live element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element geometry in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether `other` lies fully inside this box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// Attributes the driver reports for an element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescription {
    pub tag: String,
    pub role: Option<String>,
    pub text: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub placeholder: Option<String>,
}

impl ElementDescription {
    /// Role plus the first stable attribute (id, name, placeholder, text)
    pub fn identity(&self) -> Option<ElementIdentity> {
        let role = self
            .role
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.tag.clone());
        let stable_attr = [&self.id, &self.name, &self.placeholder, &self.text]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())?
            .to_string();
        if role.is_empty() {
            return None;
        }
        Some(ElementIdentity { role, stable_attr })
    }
}

/// Browser page operations consumed by the core
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Resolve a targeting spec to zero or more live elements
    async fn resolve(&self, target: &TargetSpec) -> Result<Vec<ElementHandle>, DriverError>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// `None` when the element has no layout box
    async fn bounding_box(&self, element: &ElementHandle)
        -> Result<Option<BoundingBox>, DriverError>;

    /// Currently visible region of the page
    async fn viewport(&self) -> Result<BoundingBox, DriverError>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn set_value(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    /// Keystroke entry; drivers without key simulation fall back to `set_value`
    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.set_value(element, text).await
    }

    async fn select_option(&self, element: &ElementHandle, value: &str)
        -> Result<(), DriverError>;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Current value of a form control, `None` for non-form elements
    async fn read_value(&self, element: &ElementHandle) -> Result<Option<String>, DriverError>;

    async fn describe(&self, element: &ElementHandle) -> Result<ElementDescription, DriverError>;

    /// Document title of the page
    async fn title(&self) -> Result<String, DriverError>;

    /// Address of the page as the browser currently reports it
    async fn current_url(&self) -> Result<String, DriverError>;
}

/// Title and address of the live page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub title: String,
    pub url: String,
}

impl fmt::Display for PageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page title: {}\nCurrent URL: {}", self.title, self.url)
    }
}

/// Read the page's title and current address
pub async fn page_info(driver: &dyn PageDriver) -> Result<PageInfo, DriverError> {
    Ok(PageInfo {
        title: driver.title().await?,
        url: driver.current_url().await?,
    })
}

/// Why a target did not resolve to a single usable element
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Resolve `target` and enforce the uniqueness rule of its strategy
///
/// This is the zero-side-effect probe shared by the executor, the
/// verification gate and the replay engine's control nodes.
pub async fn resolve_single(
    driver: &dyn PageDriver,
    target: &TargetSpec,
) -> Result<ElementHandle, ResolveFailure> {
    let mut handles = driver.resolve(target).await.map_err(|err| ResolveFailure {
        kind: err.failure_kind(),
        message: err.to_string(),
    })?;

    match handles.len() {
        0 => Err(ResolveFailure {
            kind: FailureKind::NotFound,
            message: format!("no element matches {}", target),
        }),
        1 => Ok(handles.remove(0)),
        n if target.requires_unique() => Err(ResolveFailure {
            kind: FailureKind::Ambiguous,
            message: format!("{} elements match {}", n, target),
        }),
        _ => Ok(handles.remove(0)),
    }
}

/// Existence (and optionally visibility) probe without interaction
pub async fn probe(
    driver: &dyn PageDriver,
    target: &TargetSpec,
    require_visible: bool,
) -> Result<bool, DriverError> {
    let handles = driver.resolve(target).await?;
    let Some(first) = handles.first() else {
        return Ok(false);
    };
    if !require_visible {
        return Ok(true);
    }
    driver.is_visible(first).await
}
