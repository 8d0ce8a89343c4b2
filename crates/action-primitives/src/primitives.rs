//! Action primitives implementation
//!
//! One primitive per built-in step kind. Every primitive takes the step's [`ExecCtx`]
//! and returns the value recorded on the step result:
//! 1. navigate - open the plan URL and wait for load
//! 2. click / click_new_page - click an element, optionally following the opened tab
//! 3. text - read the text content of an element
//! 4. input_enter - type into the first visible text input and press Enter
//! 5. sleep / wait_dom_stable - explicit waits
//! 6. screenshot - capture a page or element to a file
//! 7. elements / conditional_element - element collections and sibling checks
//! 8. switch_frame - enter the document hosted by a frame element
//! 9. activate_page / close_page - tab lifecycle

mod click;
mod elements;
mod frame;
mod navigate;
mod page;
mod screenshot;
mod text;
mod type_text;
mod wait;

pub use click::*;
pub use elements::*;
pub use frame::*;
pub use navigate::*;
pub use page::*;
pub use screenshot::*;
pub use text::*;
pub use type_text::*;
pub use wait::*;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::PageDriver;
use tabflow_core_types::StepValue;

use crate::{
    errors::ActionError,
    filters::ElementFilter,
    types::{ExecCtx, ScreenshotRequest},
    waiting::{DefaultWaitStrategy, WaitStrategy},
};

/// Action primitives trait
///
/// The execute half of every built-in step kind. Implementations validate the
/// context, perform the action through the page driver and apply built-in waiting.
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    /// Driver the primitives act through
    fn driver(&self) -> Arc<dyn PageDriver>;

    /// Wait strategy used for built-in waiting
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<StepValue, ActionError>;

    async fn click(&self, ctx: &ExecCtx, selector: Option<&str>)
        -> Result<StepValue, ActionError>;

    async fn click_new_page(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
    ) -> Result<StepValue, ActionError>;

    async fn text(&self, ctx: &ExecCtx, selector: Option<&str>) -> Result<StepValue, ActionError>;

    async fn input_enter(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
        text: &str,
    ) -> Result<StepValue, ActionError>;

    async fn sleep(&self, ctx: &ExecCtx, duration: Duration) -> Result<StepValue, ActionError>;

    async fn screenshot(
        &self,
        ctx: &ExecCtx,
        request: &ScreenshotRequest,
    ) -> Result<StepValue, ActionError>;

    async fn wait_dom_stable(&self, ctx: &ExecCtx, diff: f64) -> Result<StepValue, ActionError>;

    async fn elements(
        &self,
        ctx: &ExecCtx,
        selector: &str,
        filters: &[ElementFilter],
    ) -> Result<StepValue, ActionError>;

    async fn conditional_element(
        &self,
        ctx: &ExecCtx,
        selector: &str,
    ) -> Result<StepValue, ActionError>;

    async fn switch_frame(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
    ) -> Result<StepValue, ActionError>;

    async fn activate_page(&self, ctx: &ExecCtx) -> Result<StepValue, ActionError>;

    async fn close_page(&self, ctx: &ExecCtx) -> Result<StepValue, ActionError>;
}

/// Default implementation of action primitives
pub struct DefaultActionPrimitives {
    /// Page driver for browser communication
    driver: Arc<dyn PageDriver>,

    /// Wait strategy for built-in waiting
    wait_strategy: Arc<dyn WaitStrategy>,

    /// Base directory for screenshot files with relative or derived names
    output_dir: PathBuf,
}

impl DefaultActionPrimitives {
    pub fn new(driver: Arc<dyn PageDriver>, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        Self {
            driver,
            wait_strategy,
            output_dir: PathBuf::from("output"),
        }
    }

    /// Primitives over `driver` with the default wait strategy.
    pub fn with_driver(driver: Arc<dyn PageDriver>) -> Self {
        Self::new(driver, Arc::new(DefaultWaitStrategy::default()))
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub(crate) fn page_driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }
}

#[async_trait]
impl ActionPrimitives for DefaultActionPrimitives {
    fn driver(&self) -> Arc<dyn PageDriver> {
        Arc::clone(&self.driver)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<StepValue, ActionError> {
        execute_navigate(self, ctx, url).await
    }

    async fn click(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
    ) -> Result<StepValue, ActionError> {
        execute_click(self, ctx, selector).await
    }

    async fn click_new_page(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
    ) -> Result<StepValue, ActionError> {
        execute_click_new_page(self, ctx, selector).await
    }

    async fn text(&self, ctx: &ExecCtx, selector: Option<&str>) -> Result<StepValue, ActionError> {
        execute_text(self, ctx, selector).await
    }

    async fn input_enter(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
        text: &str,
    ) -> Result<StepValue, ActionError> {
        execute_input_enter(self, ctx, selector, text).await
    }

    async fn sleep(&self, ctx: &ExecCtx, duration: Duration) -> Result<StepValue, ActionError> {
        execute_sleep(ctx, duration).await
    }

    async fn screenshot(
        &self,
        ctx: &ExecCtx,
        request: &ScreenshotRequest,
    ) -> Result<StepValue, ActionError> {
        execute_screenshot(self, ctx, request).await
    }

    async fn wait_dom_stable(&self, ctx: &ExecCtx, diff: f64) -> Result<StepValue, ActionError> {
        execute_wait_dom_stable(self, ctx, diff).await
    }

    async fn elements(
        &self,
        ctx: &ExecCtx,
        selector: &str,
        filters: &[ElementFilter],
    ) -> Result<StepValue, ActionError> {
        execute_elements(self, ctx, selector, filters).await
    }

    async fn conditional_element(
        &self,
        ctx: &ExecCtx,
        selector: &str,
    ) -> Result<StepValue, ActionError> {
        execute_conditional_element(self, ctx, selector).await
    }

    async fn switch_frame(
        &self,
        ctx: &ExecCtx,
        selector: Option<&str>,
    ) -> Result<StepValue, ActionError> {
        execute_switch_frame(self, ctx, selector).await
    }

    async fn activate_page(&self, ctx: &ExecCtx) -> Result<StepValue, ActionError> {
        execute_activate_page(self, ctx).await
    }

    async fn close_page(&self, ctx: &ExecCtx) -> Result<StepValue, ActionError> {
        execute_close_page(self, ctx).await
    }
}
