//! Shared primitives for the tabflow step engine.
//!
//! Handles are plain identifiers: the driver that produced them is the only party able
//! to turn one back into a live DOM node or tab.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a browser tab known to a page driver.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PageId(pub String);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a DOM element known to a page driver.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document context: a tab, optionally narrowed to a nested frame document.
///
/// `frames` is the chain of iframe elements walked from the top document, outermost
/// first. An empty chain addresses the top-level document.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PageHandle {
    pub id: PageId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<ElementId>,
}

impl PageHandle {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            frames: Vec::new(),
        }
    }

    /// Handle for the document hosted by `frame`, one level below this one.
    pub fn enter_frame(&self, frame: ElementId) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self {
            id: self.id.clone(),
            frames,
        }
    }

    /// The top-level document of the same tab.
    pub fn top(&self) -> Self {
        Self::new(self.id.clone())
    }

    pub fn is_frame(&self) -> bool {
        !self.frames.is_empty()
    }
}

impl fmt::Display for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.id)?;
        for frame in &self.frames {
            write!(f, ">{}", frame)?;
        }
        Ok(())
    }
}

/// An element living inside a specific document context.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: ElementId,
    pub page: PageHandle,
}

impl ElementHandle {
    pub fn new(id: ElementId, page: PageHandle) -> Self {
        Self { id, page }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page, self.id)
    }
}

/// Payload recorded on a step result.
///
/// The variant set is closed; consumers go through the `as_*` accessors, which return
/// `None` when the payload is of another shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepValue {
    #[default]
    Null,
    Scalar(serde_json::Value),
    Element(ElementHandle),
    Page(PageHandle),
    Sequence(Vec<StepValue>),
}

impl StepValue {
    pub fn scalar(value: impl Into<serde_json::Value>) -> Self {
        StepValue::Scalar(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StepValue::Null)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, StepValue::Sequence(_))
    }

    pub fn as_element(&self) -> Option<&ElementHandle> {
        match self {
            StepValue::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_page(&self) -> Option<&PageHandle> {
        match self {
            StepValue::Page(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            StepValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(|value| value.as_str())
    }

    pub fn as_sequence(&self) -> Option<&[StepValue]> {
        match self {
            StepValue::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<ElementHandle> for StepValue {
    fn from(element: ElementHandle) -> Self {
        StepValue::Element(element)
    }
}

impl From<PageHandle> for StepValue {
    fn from(page: PageHandle) -> Self {
        StepValue::Page(page)
    }
}

impl From<String> for StepValue {
    fn from(value: String) -> Self {
        StepValue::Scalar(serde_json::Value::String(value))
    }
}

impl From<&str> for StepValue {
    fn from(value: &str) -> Self {
        StepValue::from(value.to_string())
    }
}

impl From<Vec<ElementHandle>> for StepValue {
    fn from(elements: Vec<ElementHandle>) -> Self {
        StepValue::Sequence(elements.into_iter().map(StepValue::Element).collect())
    }
}
