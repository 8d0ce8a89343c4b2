//! The capability set the step engine consumes from a live page.

use std::time::Duration;

use async_trait::async_trait;
use tabflow_core_types::{ElementHandle, PageHandle};
use tokio::time::{sleep, Instant};

use crate::error::DriverError;

/// Polling cadence for blocking lookups built on top of [`PageDriver::locate`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where a selector is evaluated: a whole document or the subtree of one element.
#[derive(Clone, Copy, Debug)]
pub enum Scope<'a> {
    Page(&'a PageHandle),
    Element(&'a ElementHandle),
}

impl<'a> Scope<'a> {
    /// Document context the scope lives in.
    pub fn page(&self) -> &'a PageHandle {
        match self {
            Scope::Page(page) => page,
            Scope::Element(element) => &element.page,
        }
    }
}

/// What a screenshot should capture.
#[derive(Clone, Debug)]
pub enum ScreenshotTarget {
    Page { page: PageHandle, full_page: bool },
    Element(ElementHandle),
}

/// Page driver: element location, input and navigation primitives against a live page.
///
/// Implementations must tolerate concurrent `locate` calls against the same page, the
/// race resolver probes several selectors at once.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Non-blocking existence probe. `Ok(None)` means the selector matched nothing.
    async fn locate(
        &self,
        scope: Scope<'_>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError>;

    /// All elements matching `selector` in document order.
    async fn locate_all(
        &self,
        scope: Scope<'_>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Blocking variant of [`PageDriver::locate`]: polls until the selector matches or
    /// `timeout` elapses.
    async fn wait_element(
        &self,
        scope: Scope<'_>,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.locate(scope, selector).await? {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::not_found(format!(
                    "selector '{}' did not appear within {}ms",
                    selector,
                    timeout.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn input_text(
        &self,
        element: &ElementHandle,
        text: &str,
        clear: bool,
    ) -> Result<(), DriverError>;

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Rendered text content of the element.
    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// DOM property (`el[name]`), `Null` when unset.
    async fn property(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<serde_json::Value, DriverError>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    async fn parent_of(&self, element: &ElementHandle)
        -> Result<Option<ElementHandle>, DriverError>;

    /// Document context hosted by a frame element.
    async fn frame_of(&self, element: &ElementHandle) -> Result<PageHandle, DriverError>;

    async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    async fn reload(&self, page: &PageHandle) -> Result<(), DriverError>;

    async fn current_url(&self, page: &PageHandle) -> Result<String, DriverError>;

    /// Block until the document finished loading.
    async fn wait_loaded(&self, page: &PageHandle, timeout: Duration) -> Result<(), DriverError>;

    /// Block until the relative DOM change between two samples falls to `diff` or below.
    async fn wait_dom_stable(
        &self,
        page: &PageHandle,
        diff: f64,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// PNG bytes of the requested target.
    async fn screenshot(&self, target: &ScreenshotTarget) -> Result<Vec<u8>, DriverError>;

    async fn activate(&self, page: &PageHandle) -> Result<(), DriverError>;

    async fn close(&self, page: &PageHandle) -> Result<(), DriverError>;

    /// Click `trigger` and wait for the tab it opens.
    async fn wait_open(
        &self,
        page: &PageHandle,
        trigger: &ElementHandle,
        timeout: Duration,
    ) -> Result<PageHandle, DriverError>;
}
