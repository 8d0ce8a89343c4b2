//! [`PageDriver`] backed by a Chromium instance driven through chromiumoxide.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::page::Viewport;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use dashmap::DashMap;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tabflow_core_types::{ElementHandle, ElementId, PageHandle, PageId};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::driver::{PageDriver, Scope, ScreenshotTarget, POLL_INTERVAL};
use crate::error::{DriverError, DriverErrorKind};
use crate::scripts;

const DOM_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct Reply<T> {
    status: String,
    value: Option<T>,
}

#[derive(Debug, Deserialize)]
struct DomSample {
    nodes: u64,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct Clip {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Drives a real Chromium browser. Pages opened by the browser (new tabs included) are
/// tracked by target id so handles stay valid across steps.
pub struct ChromiumDriver {
    browser: Browser,
    pages: DashMap<PageId, Page>,
    handler: JoinHandle<()>,
    config: CdpConfig,
}

impl ChromiumDriver {
    /// Launches a browser, or attaches to `config.websocket_url` when set.
    pub async fn start(config: CdpConfig) -> Result<Self, DriverError> {
        let (browser, mut handler) = match &config.websocket_url {
            Some(url) => {
                info!(ws = %url, "attaching to running browser");
                Browser::connect(url.clone()).await?
            }
            None => {
                let mut builder = BrowserConfig::builder();
                if !config.headless {
                    builder = builder.with_head();
                }
                if let Some(path) = &config.executable {
                    builder = builder.chrome_executable(path);
                }
                if let Some((width, height)) = config.window_size {
                    builder = builder.window_size(width, height);
                }
                let browser_config = builder
                    .build()
                    .map_err(|err| DriverError::internal(format!("browser config: {}", err)))?;
                info!(headless = config.headless, "launching browser");
                Browser::launch(browser_config).await?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
        });

        Ok(Self {
            browser,
            pages: DashMap::new(),
            handler,
            config,
        })
    }

    pub fn config(&self) -> &CdpConfig {
        &self.config
    }

    /// Opens a blank tab and returns its handle.
    pub async fn open_page(&self) -> Result<PageHandle, DriverError> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(self.track(page))
    }

    /// Closes the browser and stops the event handler.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        let result = self.browser.execute(CloseParams::default()).await;
        self.handler.abort();
        result.map(|_| ()).map_err(DriverError::from)
    }

    fn track(&self, page: Page) -> PageHandle {
        let id = PageId(page.target_id().inner().clone());
        self.pages.insert(id.clone(), page);
        PageHandle::new(id)
    }

    fn page(&self, handle: &PageHandle) -> Result<Page, DriverError> {
        self.pages
            .get(&handle.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::PageNotFound)
                    .with_hint(format!("unknown page {}", handle.id))
            })
    }

    async fn eval<T: DeserializeOwned>(
        &self,
        page: &PageHandle,
        script: String,
    ) -> Result<Reply<T>, DriverError> {
        let tab = self.page(page)?;
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .user_gesture(true)
            .build()
            .map_err(|err| DriverError::internal(format!("evaluate params: {}", err)))?;
        let result = tab.evaluate_expression(params).await?;
        result
            .into_value::<Reply<T>>()
            .map_err(|err| DriverError::internal(format!("unexpected script reply: {}", err)))
    }

    /// Evaluates an element-scoped script and maps non-`ok` statuses to errors.
    async fn eval_on<T: DeserializeOwned>(
        &self,
        page: &PageHandle,
        script: String,
        subject: &str,
    ) -> Result<Option<T>, DriverError> {
        let reply = self.eval::<T>(page, script).await?;
        match reply.status.as_str() {
            "ok" => Ok(reply.value),
            "not-found" => Err(DriverError::not_found(format!("{} is detached", subject))),
            "detached" => Err(DriverError::new(DriverErrorKind::PageNotFound)
                .with_hint(format!("document of {} is gone", subject))),
            "invalid" => Err(DriverError::new(DriverErrorKind::Unsupported)
                .with_hint(format!("invalid selector {}", subject))),
            "not-frame" => Err(DriverError::new(DriverErrorKind::Unsupported)
                .with_hint(format!("{} is not a frame element", subject))),
            "cross-origin" => Err(DriverError::new(DriverErrorKind::Unsupported)
                .with_hint(format!("frame {} is not accessible", subject))),
            other => Err(DriverError::internal(format!(
                "unknown script status '{}' for {}",
                other, subject
            ))),
        }
    }

    async fn dispatch_enter(&self, tab: &Page) -> Result<(), DriverError> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key("Enter")
                .code("Enter")
                .text("\r")
                .windows_virtual_key_code(13)
                .native_virtual_key_code(13)
                .build()
                .map_err(|err| DriverError::internal(format!("key event: {}", err)))?;
            tab.execute(params).await?;
        }
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn locate(
        &self,
        scope: Scope<'_>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let page = scope.page();
        let fresh = ElementId::new();
        let token = self
            .eval_on::<String>(page, scripts::locate(scope, selector, &fresh.0), selector)
            .await?;
        Ok(token.map(|token| ElementHandle::new(ElementId(token), page.clone())))
    }

    async fn locate_all(
        &self,
        scope: Scope<'_>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let page = scope.page();
        let fresh = ElementId::new();
        let tokens = self
            .eval_on::<Vec<String>>(page, scripts::locate_all(scope, selector, &fresh.0), selector)
            .await?
            .unwrap_or_default();
        Ok(tokens
            .into_iter()
            .map(|token| ElementHandle::new(ElementId(token), page.clone()))
            .collect())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.eval_on::<serde_json::Value>(
            &element.page,
            scripts::click(element),
            &element.to_string(),
        )
        .await?;
        Ok(())
    }

    async fn input_text(
        &self,
        element: &ElementHandle,
        text: &str,
        clear: bool,
    ) -> Result<(), DriverError> {
        self.eval_on::<serde_json::Value>(
            &element.page,
            scripts::focus(element, clear),
            &element.to_string(),
        )
        .await?;
        let tab = self.page(&element.page)?;
        tab.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.eval_on::<serde_json::Value>(
            &element.page,
            scripts::focus(element, false),
            &element.to_string(),
        )
        .await?;
        let tab = self.page(&element.page)?;
        self.dispatch_enter(&tab).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let text = self
            .eval_on::<String>(&element.page, scripts::text(element), &element.to_string())
            .await?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.eval_on::<String>(
            &element.page,
            scripts::attribute(element, name),
            &element.to_string(),
        )
        .await
    }

    async fn property(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<serde_json::Value, DriverError> {
        let value = self
            .eval_on::<serde_json::Value>(
                &element.page,
                scripts::property(element, name),
                &element.to_string(),
            )
            .await?;
        Ok(value.unwrap_or(serde_json::Value::Null))
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let shown = self
            .eval_on::<bool>(&element.page, scripts::visible(element), &element.to_string())
            .await?;
        Ok(shown.unwrap_or(false))
    }

    async fn parent_of(
        &self,
        element: &ElementHandle,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let fresh = ElementId::new();
        let token = self
            .eval_on::<String>(
                &element.page,
                scripts::parent(element, &fresh.0),
                &element.to_string(),
            )
            .await?;
        Ok(token.map(|token| ElementHandle::new(ElementId(token), element.page.clone())))
    }

    async fn frame_of(&self, element: &ElementHandle) -> Result<PageHandle, DriverError> {
        self.eval_on::<serde_json::Value>(
            &element.page,
            scripts::frame_document(element),
            &element.to_string(),
        )
        .await?;
        Ok(element.page.enter_frame(element.id.clone()))
    }

    async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        limit: Duration,
    ) -> Result<(), DriverError> {
        let tab = self.page(page)?;
        debug!(page = %page, url, "navigating");
        match timeout(limit, tab.goto(url)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(DriverError::timeout(format!(
                "navigation to {} exceeded {}ms",
                url,
                limit.as_millis()
            ))),
        }
    }

    async fn reload(&self, page: &PageHandle) -> Result<(), DriverError> {
        let tab = self.page(page)?;
        let limit = Duration::from_millis(self.config.default_deadline_ms);
        match timeout(limit, tab.reload()).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(DriverError::timeout(format!("reload of {} timed out", page))),
        }
    }

    async fn current_url(&self, page: &PageHandle) -> Result<String, DriverError> {
        let tab = self.page(page)?;
        Ok(tab.url().await?.unwrap_or_default())
    }

    async fn wait_loaded(&self, page: &PageHandle, limit: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + limit;
        loop {
            let reply = self.eval::<String>(page, scripts::ready_state(page)).await;
            match reply {
                Ok(reply) if reply.value.as_deref() == Some("complete") => return Ok(()),
                Ok(_) => {}
                // documents are swapped during navigation
                Err(err) if err.kind == DriverErrorKind::CdpIo => {
                    debug!(page = %page, error = %err, "ready state probe failed");
                }
                Err(err) => return Err(err),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(format!(
                    "{} did not finish loading within {}ms",
                    page,
                    limit.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_dom_stable(
        &self,
        page: &PageHandle,
        diff: f64,
        limit: Duration,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + limit;
        let mut previous: Option<DomSample> = None;
        loop {
            let sample = self
                .eval_on::<DomSample>(page, scripts::dom_sample(page), &page.to_string())
                .await?;
            if let (Some(before), Some(after)) = (previous.as_ref(), sample.as_ref()) {
                if relative_change(before, after) <= diff {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(format!(
                    "{} kept changing for {}ms",
                    page,
                    limit.as_millis()
                )));
            }
            previous = sample;
            sleep(DOM_SAMPLE_INTERVAL).await;
        }
    }

    async fn screenshot(&self, target: &ScreenshotTarget) -> Result<Vec<u8>, DriverError> {
        match target {
            ScreenshotTarget::Page { page, full_page } => {
                let tab = self.page(page)?;
                let params = ScreenshotParams::builder().full_page(*full_page).build();
                Ok(tab.screenshot(params).await?)
            }
            ScreenshotTarget::Element(element) => {
                let clip = self
                    .eval_on::<Clip>(
                        &element.page,
                        scripts::element_clip(element),
                        &element.to_string(),
                    )
                    .await?
                    .ok_or_else(|| DriverError::not_found(format!("{} has no box", element)))?;
                if clip.width <= 0.0 || clip.height <= 0.0 {
                    return Err(DriverError::not_found(format!(
                        "{} has an empty bounding box",
                        element
                    )));
                }
                let tab = self.page(&element.page)?;
                let params = ScreenshotParams::builder()
                    .clip(Viewport {
                        x: clip.x,
                        y: clip.y,
                        width: clip.width,
                        height: clip.height,
                        scale: 1.0,
                    })
                    .build();
                Ok(tab.screenshot(params).await?)
            }
        }
    }

    async fn activate(&self, page: &PageHandle) -> Result<(), DriverError> {
        let tab = self.page(page)?;
        tab.activate().await?;
        Ok(())
    }

    async fn close(&self, page: &PageHandle) -> Result<(), DriverError> {
        let (_, tab) = self.pages.remove(&page.id).ok_or_else(|| {
            DriverError::new(DriverErrorKind::PageNotFound)
                .with_hint(format!("unknown page {}", page.id))
        })?;
        tab.close().await?;
        Ok(())
    }

    async fn wait_open(
        &self,
        page: &PageHandle,
        trigger: &ElementHandle,
        limit: Duration,
    ) -> Result<PageHandle, DriverError> {
        let known: HashSet<String> = self
            .browser
            .pages()
            .await?
            .iter()
            .map(|tab| tab.target_id().inner().clone())
            .collect();

        self.click(trigger).await?;

        let deadline = Instant::now() + limit;
        loop {
            for tab in self.browser.pages().await? {
                let id = tab.target_id().inner().clone();
                if !known.contains(&id) && !self.pages.contains_key(&PageId(id.clone())) {
                    debug!(opener = %page, target = %id, "new tab opened");
                    return Ok(self.track(tab));
                }
            }
            if Instant::now() >= deadline {
                warn!(opener = %page, "click did not open a new tab");
                return Err(DriverError::timeout(format!(
                    "no new tab opened from {} within {}ms",
                    page,
                    limit.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

fn relative_change(before: &DomSample, after: &DomSample) -> f64 {
    let ratio = |a: u64, b: u64| {
        let base = a.max(1) as f64;
        (a as f64 - b as f64).abs() / base
    };
    ratio(before.nodes, after.nodes).max(ratio(before.size, after.size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_change_uses_the_larger_delta() {
        let before = DomSample {
            nodes: 100,
            size: 1000,
        };
        let after = DomSample {
            nodes: 101,
            size: 1300,
        };
        let change = relative_change(&before, &after);
        assert!((change - 0.3).abs() < 1e-9);
    }

    #[test]
    fn empty_documents_do_not_divide_by_zero() {
        let empty = DomSample { nodes: 0, size: 0 };
        assert_eq!(relative_change(&empty, &empty), 0.0);
    }

    #[test]
    fn script_replies_decode_without_value() {
        let reply: Reply<String> = serde_json::from_value(serde_json::json!({
            "status": "not-found"
        }))
        .unwrap();
        assert_eq!(reply.status, "not-found");
        assert!(reply.value.is_none());
    }
}
