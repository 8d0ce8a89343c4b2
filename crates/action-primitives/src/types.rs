//! Core data types for action primitives

use std::time::{Duration, Instant};

use cdp_adapter::Scope;
use serde::{Deserialize, Serialize};
use tabflow_core_types::{ElementHandle, PageHandle, StepValue};

use crate::errors::ActionError;

/// Execution context for one step
///
/// Carries the page the run started on, the value and path of the result the step
/// inherits (previous parent or fan-out item), and the step's own timeout.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Page the run is bound to
    pub page: PageHandle,

    /// Value of the inherited result, `Null` at the root
    pub inherited: StepValue,

    /// Path of the inherited result; equals `path` at the root
    pub inherited_path: String,

    /// Path of the step being executed
    pub path: String,

    /// Budget for blocking operations of this step
    pub timeout: Duration,

    /// Deadline derived from `timeout` when the context was built
    pub deadline: Instant,

    /// Unique identifier for this action
    pub action_id: String,
}

impl ExecCtx {
    pub fn new(page: PageHandle, path: impl Into<String>, timeout: Duration) -> Self {
        let path = path.into();
        Self {
            page,
            inherited: StepValue::Null,
            inherited_path: path.clone(),
            path,
            timeout,
            deadline: Instant::now() + timeout,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Binds the context to a previously produced result.
    pub fn inherit(mut self, value: StepValue, path: impl Into<String>) -> Self {
        self.inherited = value;
        self.inherited_path = path.into();
        self
    }

    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Inherited element, if the previous result carries one.
    pub fn inherited_element(&self) -> Option<&ElementHandle> {
        self.inherited.as_element()
    }

    /// Inherited page handle when present, otherwise the run's page.
    pub fn target_page(&self) -> &PageHandle {
        self.inherited.as_page().unwrap_or(&self.page)
    }

    /// Where selectors of this step are evaluated: inside the inherited element, the
    /// inherited page, or the run's page.
    pub fn scope(&self) -> Scope<'_> {
        match self.inherited_element() {
            Some(element) => Scope::Element(element),
            None => Scope::Page(self.target_page()),
        }
    }

    pub fn require_element(&self, step: &str) -> Result<&ElementHandle, ActionError> {
        self.inherited_element().ok_or_else(|| {
            ActionError::MissingContext(format!(
                "{} at '{}' needs an element from the previous result",
                step, self.path
            ))
        })
    }
}

/// Built-in waiting tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum WaitTier {
    /// No built-in waiting
    None,

    /// Wait for the document to finish loading
    #[default]
    Loaded,

    /// Loaded, then wait until the DOM stops changing
    Settled,
}

/// Screenshot request of the Screenshot step kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRequest {
    /// Element to capture instead of the page
    pub selector: Option<String>,

    /// Target file; derived from the inherited path when unset
    pub file: Option<String>,

    /// Capture beyond the viewport
    pub full_page: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core_types::{ElementId, PageId};

    #[test]
    fn scope_prefers_inherited_element_then_page() {
        let run_page = PageHandle::new(PageId::new());
        let other = PageHandle::new(PageId::new());
        let ctx = ExecCtx::new(run_page.clone(), "root", Duration::from_secs(1));
        assert!(matches!(ctx.scope(), Scope::Page(page) if *page == run_page));

        let ctx = ctx.inherit(StepValue::from(other.clone()), "root");
        assert_eq!(ctx.target_page(), &other);
        assert!(ctx.require_element("Text").is_err());

        let element = ElementHandle::new(ElementId::new(), other);
        let ctx = ctx.inherit(StepValue::from(element.clone()), "root_1");
        assert!(matches!(ctx.scope(), Scope::Element(el) if *el == element));
        assert_eq!(ctx.inherited_path, "root_1");
    }
}
