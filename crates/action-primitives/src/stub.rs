//! In-memory page driver for tests and offline runs
//!
//! Elements are declared up front with the behaviours a flaky page shows:
//! late rendering, layout shifts, disappearing after a click, intercepted
//! clicks and inputs that swallow values.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::DriverError;
use crate::locator::{BoundingBox, ElementDescription, ElementHandle, PageDriver};
use crate::types::{ElementCategory, TargetSpec};

const VIEWPORT: BoundingBox = BoundingBox {
    x: 0.0,
    y: 0.0,
    width: 1280.0,
    height: 720.0,
};

/// Recorded driver interaction
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Click(ElementHandle),
    SetValue(ElementHandle, String),
    TypeText(ElementHandle, String),
    Select(ElementHandle, String),
    Navigate(String),
    Scroll(ElementHandle),
}

/// Declarative element for [`StubPage`]
#[derive(Debug, Clone)]
pub struct StubElement {
    pub handle: ElementHandle,
    pub category: Option<ElementCategory>,
    pub css: Vec<String>,
    pub xpath: Option<String>,
    pub label: Option<String>,
    pub description: ElementDescription,
    pub visible: bool,
    pub present: bool,
    /// Box samples; the front is popped per sample until one remains
    pub boxes: VecDeque<BoundingBox>,
    pub value: String,
    pub options: Vec<String>,
    /// Matching resolves that still report nothing
    pub appears_after: u32,
    pub remove_on_click: bool,
    pub ignore_input: bool,
    /// Clicks that fail with a driver error before clicks succeed
    pub click_failures: u32,
}

impl StubElement {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            handle: ElementHandle::new(id.clone()),
            category: None,
            css: vec![format!("#{}", id)],
            xpath: None,
            label: None,
            description: ElementDescription {
                tag: "div".to_string(),
                id: Some(id),
                ..Default::default()
            },
            visible: true,
            present: true,
            boxes: VecDeque::from(vec![BoundingBox::new(10.0, 10.0, 120.0, 32.0)]),
            value: String::new(),
            options: Vec::new(),
            appears_after: 0,
            remove_on_click: false,
            ignore_input: false,
            click_failures: 0,
        }
    }

    /// `<button>` with visible text
    pub fn button(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(id);
        el.category = Some(ElementCategory::Buttons);
        el.description.tag = "button".to_string();
        el.description.role = Some("button".to_string());
        el.description.text = Some(text.into());
        el
    }

    /// `<a href>` with visible text
    pub fn link(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(id);
        el.category = Some(ElementCategory::Links);
        el.description.tag = "a".to_string();
        el.description.role = Some("link".to_string());
        el.description.text = Some(text.into());
        el
    }

    /// Text input with a label
    pub fn input(id: impl Into<String>, label: impl Into<String>) -> Self {
        let mut el = Self::new(id);
        el.category = Some(ElementCategory::Inputs);
        el.description.tag = "input".to_string();
        el.description.role = Some("textbox".to_string());
        el.label = Some(label.into());
        el
    }

    /// `<select>` with options
    pub fn select<I, S>(id: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut el = Self::new(id);
        el.category = Some(ElementCategory::Selects);
        el.description.tag = "select".to_string();
        el.description.role = Some("combobox".to_string());
        el.label = Some(label.into());
        el.options = options.into_iter().map(Into::into).collect();
        el
    }

    pub fn with_css(mut self, selector: impl Into<String>) -> Self {
        self.css.push(selector.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.description.name = Some(name.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.description.placeholder = Some(placeholder.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Box moves for `shifts` samples before settling
    pub fn shifting(mut self, shifts: u32) -> Self {
        let settled = self.boxes.back().copied().unwrap_or(BoundingBox::new(10.0, 10.0, 120.0, 32.0));
        let mut boxes: VecDeque<BoundingBox> = (0..shifts)
            .map(|i| BoundingBox::new(settled.x, settled.y + 20.0 * (shifts - i) as f64, settled.width, settled.height))
            .collect();
        boxes.push_back(settled);
        self.boxes = boxes;
        self
    }

    /// Box never settles
    pub fn never_settles(mut self) -> Self {
        self.boxes = (0..10_000)
            .map(|i| BoundingBox::new(10.0, 10.0 + (i % 2) as f64 * 5.0, 120.0, 32.0))
            .collect();
        self
    }

    /// Box starts below the viewport
    pub fn offscreen(mut self) -> Self {
        self.boxes = VecDeque::from(vec![BoundingBox::new(10.0, 2000.0, 120.0, 32.0)]);
        self
    }

    pub fn appears_after(mut self, resolves: u32) -> Self {
        self.appears_after = resolves;
        self
    }

    pub fn removed_on_click(mut self) -> Self {
        self.remove_on_click = true;
        self
    }

    pub fn ignores_input(mut self) -> Self {
        self.ignore_input = true;
        self
    }

    pub fn failing_clicks(mut self, failures: u32) -> Self {
        self.click_failures = failures;
        self
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    fn matches(&self, target: &TargetSpec) -> bool {
        match target {
            TargetSpec::Css(selector) => {
                self.css.iter().any(|s| s == selector)
                    || self
                        .category
                        .map(|c| c.selector() == selector)
                        .unwrap_or(false)
            }
            TargetSpec::XPath(xpath) => self.xpath.as_deref() == Some(xpath.as_str()),
            TargetSpec::Label(label) => {
                self.label.as_deref() == Some(label.as_str())
                    || self.description.placeholder.as_deref() == Some(label.as_str())
            }
            TargetSpec::Text(t) => {
                let text_matches = self
                    .description
                    .text
                    .as_deref()
                    .map(|text| text.trim() == t.text.trim())
                    .unwrap_or(false);
                let type_matches = t
                    .element_type
                    .map(|kind| self.category == Some(kind))
                    .unwrap_or(true);
                text_matches && type_matches
            }
            TargetSpec::Index(_) => false,
        }
    }
}

#[derive(Debug, Default)]
struct StubState {
    elements: Vec<StubElement>,
    interactions: Vec<Interaction>,
    resolve_calls: u32,
    url: Option<String>,
    title: String,
}

/// Scriptable in-memory [`PageDriver`]
#[derive(Debug, Default)]
pub struct StubPage {
    state: Mutex<StubState>,
}

impl StubPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = StubElement>,
    {
        let page = Self::new();
        for element in elements {
            page.add(element);
        }
        page
    }

    pub fn add(&self, element: StubElement) {
        self.state.lock().elements.push(element);
    }

    /// Detach an element from the page
    pub fn remove(&self, id: &str) {
        self.set_present(id, false);
    }

    /// Re-attach a removed element
    pub fn restore(&self, id: &str) {
        self.set_present(id, true);
    }

    fn set_present(&self, id: &str, present: bool) {
        let mut state = self.state.lock();
        if let Some(el) = state.elements.iter_mut().find(|el| el.handle.0 == id) {
            el.present = present;
        }
    }

    pub fn value_of(&self, id: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .find(|el| el.handle.0 == id)
            .map(|el| el.value.clone())
    }

    pub fn is_present(&self, id: &str) -> bool {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .any(|el| el.handle.0 == id && el.present)
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.state.lock().interactions.clone()
    }

    pub fn resolve_calls(&self) -> u32 {
        self.state.lock().resolve_calls
    }

    /// Page as if already loaded at `url`
    pub fn at(self, url: impl Into<String>, title: impl Into<String>) -> Self {
        {
            let mut state = self.state.lock();
            state.url = Some(url.into());
            state.title = title.into();
        }
        self
    }

    /// Last navigated address, `None` before any navigation
    pub fn navigated_url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    fn with_element<T>(
        &self,
        element: &ElementHandle,
        f: impl FnOnce(&mut StubElement, &mut Vec<Interaction>) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let mut state = self.state.lock();
        let StubState {
            elements,
            interactions,
            ..
        } = &mut *state;
        let el = elements
            .iter_mut()
            .find(|el| &el.handle == element && el.present)
            .ok_or_else(|| DriverError::Detached(element.to_string()))?;
        f(el, interactions)
    }
}

#[async_trait]
impl PageDriver for StubPage {
    async fn resolve(&self, target: &TargetSpec) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.lock();
        state.resolve_calls += 1;

        if let TargetSpec::Index(index) = target {
            let handle = state
                .elements
                .iter()
                .filter(|el| el.present && el.category == Some(index.category))
                .nth(index.index)
                .map(|el| el.handle.clone());
            return Ok(handle.into_iter().collect());
        }

        let mut found = Vec::new();
        for el in state.elements.iter_mut().filter(|el| el.present) {
            if !el.matches(target) {
                continue;
            }
            if el.appears_after > 0 {
                el.appears_after -= 1;
                continue;
            }
            found.push(el.handle.clone());
        }
        Ok(found)
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        self.with_element(element, |el, _| Ok(el.visible))
    }

    async fn bounding_box(
        &self,
        element: &ElementHandle,
    ) -> Result<Option<BoundingBox>, DriverError> {
        self.with_element(element, |el, _| {
            if el.boxes.len() > 1 {
                Ok(el.boxes.pop_front())
            } else {
                Ok(el.boxes.front().copied())
            }
        })
    }

    async fn viewport(&self) -> Result<BoundingBox, DriverError> {
        Ok(VIEWPORT)
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.with_element(element, |el, log| {
            let current = el
                .boxes
                .back()
                .copied()
                .unwrap_or(BoundingBox::new(10.0, 10.0, 120.0, 32.0));
            el.boxes = VecDeque::from(vec![BoundingBox::new(
                current.x,
                100.0,
                current.width,
                current.height,
            )]);
            log.push(Interaction::Scroll(el.handle.clone()));
            Ok(())
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.with_element(element, |el, log| {
            if el.click_failures > 0 {
                el.click_failures -= 1;
                return Err(DriverError::Io(format!(
                    "click on {} intercepted by overlay",
                    el.handle
                )));
            }
            log.push(Interaction::Click(el.handle.clone()));
            if el.remove_on_click {
                el.present = false;
            }
            Ok(())
        })
    }

    async fn set_value(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.with_element(element, |el, log| {
            log.push(Interaction::SetValue(el.handle.clone(), text.to_string()));
            if !el.ignore_input {
                el.value = text.to_string();
            }
            Ok(())
        })
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.with_element(element, |el, log| {
            log.push(Interaction::TypeText(el.handle.clone(), text.to_string()));
            if !el.ignore_input {
                el.value.push_str(text);
            }
            Ok(())
        })
    }

    async fn select_option(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.with_element(element, |el, log| {
            if !el.options.is_empty() && !el.options.iter().any(|o| o == value) {
                return Err(DriverError::OptionNotFound(value.to_string()));
            }
            log.push(Interaction::Select(el.handle.clone(), value.to_string()));
            el.value = value.to_string();
            Ok(())
        })
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.interactions.push(Interaction::Navigate(url.to_string()));
        state.url = Some(url.to_string());
        Ok(())
    }

    async fn read_value(&self, element: &ElementHandle) -> Result<Option<String>, DriverError> {
        self.with_element(element, |el, _| {
            let is_form = matches!(
                el.category,
                Some(ElementCategory::Inputs)
                    | Some(ElementCategory::Textareas)
                    | Some(ElementCategory::Selects)
            );
            Ok(is_form.then(|| el.value.clone()))
        })
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementDescription, DriverError> {
        self.with_element(element, |el, _| Ok(el.description.clone()))
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().title.clone())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .state
            .lock()
            .url
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }
}
