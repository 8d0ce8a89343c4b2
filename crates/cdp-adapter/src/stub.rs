//! Scripted in-memory page model.
//!
//! Pages are trees of [`StubNode`]s. A node matches a selector when the selector string
//! is one of its declared selectors, so tests spell out exactly which probes succeed.
//! Nodes can be delayed, limited to a range of reloads, hidden, or made to open a new
//! tab on click; every side effect is appended to an event log for assertions.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tabflow_core_types::{ElementHandle, ElementId, PageHandle, PageId};
use tokio::time::{sleep, Instant};

use crate::driver::{PageDriver, Scope, ScreenshotTarget, POLL_INTERVAL};
use crate::error::{DriverError, DriverErrorKind};

/// Bytes returned for every stub screenshot: the PNG signature.
pub const STUB_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone, Debug, Default)]
pub struct StubNode {
    selectors: Vec<String>,
    text: String,
    attrs: HashMap<String, String>,
    props: HashMap<String, Value>,
    hidden: bool,
    children: Vec<StubNode>,
    frame: Option<Vec<StubNode>>,
    appear_after: Option<Duration>,
    from_reload: u32,
    until_reload: Option<u32>,
    opens: Option<StubPage>,
}

impl StubNode {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selectors: vec![selector.into()],
            ..Self::default()
        }
    }

    /// Additional selector this node answers to.
    pub fn alias(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn child(mut self, child: StubNode) -> Self {
        self.children.push(child);
        self
    }

    /// Turns the node into a frame hosting `document`.
    pub fn frame(mut self, document: Vec<StubNode>) -> Self {
        self.frame = Some(document);
        self
    }

    /// Node shows up only once `delay` has passed since the last load.
    pub fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = Some(delay);
        self
    }

    /// Node exists only after the page was reloaded at least `count` times.
    pub fn after_reloads(mut self, count: u32) -> Self {
        self.from_reload = count;
        self
    }

    /// Node disappears once the page was reloaded `count` times.
    pub fn until_reloads(mut self, count: u32) -> Self {
        self.until_reload = Some(count);
        self
    }

    /// Clicking the node opens `page` in a new tab.
    pub fn opens(mut self, page: StubPage) -> Self {
        self.opens = Some(page);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct StubPage {
    url: String,
    nodes: Vec<StubNode>,
    settle_after: Option<Duration>,
}

impl StubPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn node(mut self, node: StubNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// The DOM keeps changing until `delay` after each load.
    pub fn settle_after(mut self, delay: Duration) -> Self {
        self.settle_after = Some(delay);
        self
    }
}

/// Side effects recorded by the stub, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum StubEvent {
    Navigate { page: PageId, url: String },
    Reload { page: PageId },
    Click { target: String },
    Input { target: String, text: String },
    Enter { target: String },
    Screenshot { target: String },
    Opened { page: PageId, url: String },
    Activate { page: PageId },
    Close { page: PageId },
}

#[derive(Debug)]
struct Entry {
    node: StubNode,
    page: PageId,
    parent: Option<usize>,
    // frame element whose document holds the node, None for the top document
    document: Option<usize>,
    value: String,
}

#[derive(Debug)]
struct PageState {
    url: String,
    loaded_at: Instant,
    reloads: u32,
    settle_after: Option<Duration>,
    closed: bool,
}

#[derive(Debug, Default)]
struct World {
    entries: Vec<Entry>,
    pages: HashMap<PageId, PageState>,
    page_order: Vec<PageId>,
    events: Vec<StubEvent>,
    unreachable: Vec<String>,
}

impl World {
    fn add_page(&mut self, page: StubPage) -> PageHandle {
        let id = PageId::new();
        self.pages.insert(
            id.clone(),
            PageState {
                url: page.url,
                loaded_at: Instant::now(),
                reloads: 0,
                settle_after: page.settle_after,
                closed: false,
            },
        );
        self.page_order.push(id.clone());
        for node in page.nodes {
            self.insert(node, &id, None, None);
        }
        PageHandle::new(id)
    }

    fn insert(
        &mut self,
        mut node: StubNode,
        page: &PageId,
        parent: Option<usize>,
        document: Option<usize>,
    ) {
        let children = std::mem::take(&mut node.children);
        let frame = node.frame.take();
        let value = node
            .attrs
            .get("value")
            .cloned()
            .unwrap_or_default();
        let index = self.entries.len();
        self.entries.push(Entry {
            node,
            page: page.clone(),
            parent,
            document,
            value,
        });
        for child in children {
            self.insert(child, page, Some(index), document);
        }
        if let Some(nodes) = frame {
            // keep an empty frame marker so frame_of can tell frames apart
            self.entries[index].node.frame = Some(Vec::new());
            for child in nodes {
                self.insert(child, page, None, Some(index));
            }
        }
    }

    fn page_state(&self, id: &PageId) -> Result<&PageState, DriverError> {
        match self.pages.get(id) {
            Some(state) if !state.closed => Ok(state),
            _ => Err(DriverError::new(DriverErrorKind::PageNotFound)
                .with_hint(format!("unknown page {}", id))),
        }
    }

    fn alive(&self, index: usize, now: Instant) -> bool {
        let entry = &self.entries[index];
        let Ok(state) = self.page_state(&entry.page) else {
            return false;
        };
        let node = &entry.node;
        let in_window = state.reloads >= node.from_reload
            && node.until_reload.map_or(true, |until| state.reloads < until);
        let appeared = node
            .appear_after
            .map_or(true, |delay| now >= state.loaded_at + delay);
        if !(in_window && appeared) {
            return false;
        }
        let container = entry.parent.or(entry.document);
        container.map_or(true, |up| self.alive(up, now))
    }

    fn is_descendant(&self, index: usize, ancestor: usize) -> bool {
        let mut cursor = self.entries[index].parent;
        while let Some(up) = cursor {
            if up == ancestor {
                return true;
            }
            cursor = self.entries[up].parent;
        }
        false
    }

    fn resolve(&self, element: &ElementHandle) -> Result<usize, DriverError> {
        let index = parse_id(&element.id)
            .filter(|index| *index < self.entries.len())
            .ok_or_else(|| DriverError::not_found(format!("unknown element {}", element)))?;
        if !self.alive(index, Instant::now()) {
            return Err(DriverError::not_found(format!("{} is detached", element)));
        }
        Ok(index)
    }

    fn document_of(page: &PageHandle) -> Option<usize> {
        page.frames.last().and_then(parse_id)
    }

    fn matches(&self, scope: Scope<'_>, selector: &str) -> Result<Vec<usize>, DriverError> {
        let page = scope.page();
        self.page_state(&page.id)?;
        let document = Self::document_of(page);
        let root = match scope {
            Scope::Page(_) => None,
            Scope::Element(element) => Some(self.resolve(element)?),
        };
        let now = Instant::now();
        Ok((0..self.entries.len())
            .filter(|index| {
                let entry = &self.entries[*index];
                entry.page == page.id
                    && entry.document == document
                    && entry.node.selectors.iter().any(|s| s == selector)
                    && root.map_or(true, |root| self.is_descendant(*index, root))
                    && self.alive(*index, now)
            })
            .collect())
    }

    fn label(&self, index: usize) -> String {
        self.entries[index]
            .node
            .selectors
            .first()
            .cloned()
            .unwrap_or_default()
    }

    fn handle(&self, index: usize, page: &PageHandle) -> ElementHandle {
        ElementHandle::new(ElementId(format!("node-{}", index)), page.clone())
    }

    /// Clicks the node, opening its target tab when it has one.
    fn click(&mut self, index: usize) -> Option<PageHandle> {
        let target = self.label(index);
        self.events.push(StubEvent::Click { target });
        let opens = self.entries[index].node.opens.clone()?;
        let url = opens.url.clone();
        let handle = self.add_page(opens);
        self.events.push(StubEvent::Opened {
            page: handle.id.clone(),
            url,
        });
        Some(handle)
    }
}

fn parse_id(id: &ElementId) -> Option<usize> {
    id.0.strip_prefix("node-")?.parse().ok()
}

/// In-memory [`PageDriver`] for tests.
#[derive(Debug, Default)]
pub struct StubDriver {
    world: Mutex<World>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tab and returns its handle.
    pub fn add_page(&self, page: StubPage) -> PageHandle {
        self.world.lock().add_page(page)
    }

    /// Navigation to `url` will time out.
    pub fn fail_navigation_to(&self, url: impl Into<String>) {
        self.world.lock().unreachable.push(url.into());
    }

    pub fn events(&self) -> Vec<StubEvent> {
        self.world.lock().events.clone()
    }

    pub fn reload_count(&self, page: &PageHandle) -> u32 {
        self.world
            .lock()
            .pages
            .get(&page.id)
            .map(|state| state.reloads)
            .unwrap_or(0)
    }

    /// Current `value` of an input node.
    pub fn value_of(&self, element: &ElementHandle) -> Option<String> {
        let world = self.world.lock();
        let index = parse_id(&element.id)?;
        world.entries.get(index).map(|entry| entry.value.clone())
    }

    /// Open tabs in creation order.
    pub fn open_pages(&self) -> Vec<PageHandle> {
        let world = self.world.lock();
        world
            .page_order
            .iter()
            .filter(|id| world.pages.get(*id).map_or(false, |state| !state.closed))
            .map(|id| PageHandle::new(id.clone()))
            .collect()
    }
}

#[async_trait]
impl PageDriver for StubDriver {
    async fn locate(
        &self,
        scope: Scope<'_>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let world = self.world.lock();
        let found = world.matches(scope, selector)?;
        Ok(found
            .first()
            .map(|index| world.handle(*index, scope.page())))
    }

    async fn locate_all(
        &self,
        scope: Scope<'_>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let world = self.world.lock();
        let found = world.matches(scope, selector)?;
        Ok(found
            .into_iter()
            .map(|index| world.handle(index, scope.page()))
            .collect())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        let index = world.resolve(element)?;
        world.click(index);
        Ok(())
    }

    async fn input_text(
        &self,
        element: &ElementHandle,
        text: &str,
        clear: bool,
    ) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        let index = world.resolve(element)?;
        let target = world.label(index);
        let entry = &mut world.entries[index];
        if clear {
            entry.value.clear();
        }
        entry.value.push_str(text);
        world.events.push(StubEvent::Input {
            target,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        let index = world.resolve(element)?;
        let target = world.label(index);
        world.events.push(StubEvent::Enter { target });
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let world = self.world.lock();
        let index = world.resolve(element)?;
        Ok(world.entries[index].node.text.clone())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let world = self.world.lock();
        let index = world.resolve(element)?;
        Ok(world.entries[index].node.attrs.get(name).cloned())
    }

    async fn property(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Value, DriverError> {
        let world = self.world.lock();
        let index = world.resolve(element)?;
        let entry = &world.entries[index];
        let value = match name {
            "value" => Value::String(entry.value.clone()),
            "innerText" | "textContent" => Value::String(entry.node.text.clone()),
            _ => entry.node.props.get(name).cloned().unwrap_or(Value::Null),
        };
        Ok(value)
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let world = self.world.lock();
        let index = world.resolve(element)?;
        Ok(!world.entries[index].node.hidden)
    }

    async fn parent_of(
        &self,
        element: &ElementHandle,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let world = self.world.lock();
        let index = world.resolve(element)?;
        Ok(world.entries[index]
            .parent
            .map(|parent| world.handle(parent, &element.page)))
    }

    async fn frame_of(&self, element: &ElementHandle) -> Result<PageHandle, DriverError> {
        let world = self.world.lock();
        let index = world.resolve(element)?;
        if world.entries[index].node.frame.is_none() {
            return Err(DriverError::new(DriverErrorKind::Unsupported)
                .with_hint(format!("{} is not a frame element", element)));
        }
        Ok(element.page.enter_frame(element.id.clone()))
    }

    async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        world.page_state(&page.id)?;
        if world.unreachable.iter().any(|blocked| blocked == url) {
            return Err(DriverError::timeout(format!(
                "navigation to {} exceeded {}ms",
                url,
                timeout.as_millis()
            )));
        }
        if let Some(state) = world.pages.get_mut(&page.id) {
            state.url = url.to_string();
            state.loaded_at = Instant::now();
        }
        world.events.push(StubEvent::Navigate {
            page: page.id.clone(),
            url: url.to_string(),
        });
        Ok(())
    }

    async fn reload(&self, page: &PageHandle) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        world.page_state(&page.id)?;
        if let Some(state) = world.pages.get_mut(&page.id) {
            state.reloads += 1;
            state.loaded_at = Instant::now();
        }
        world.events.push(StubEvent::Reload {
            page: page.id.clone(),
        });
        Ok(())
    }

    async fn current_url(&self, page: &PageHandle) -> Result<String, DriverError> {
        let world = self.world.lock();
        Ok(world.page_state(&page.id)?.url.clone())
    }

    async fn wait_loaded(&self, page: &PageHandle, _timeout: Duration) -> Result<(), DriverError> {
        self.world.lock().page_state(&page.id)?;
        Ok(())
    }

    async fn wait_dom_stable(
        &self,
        page: &PageHandle,
        _diff: f64,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let settled = {
                let world = self.world.lock();
                let state = world.page_state(&page.id)?;
                state
                    .settle_after
                    .map_or(true, |delay| Instant::now() >= state.loaded_at + delay)
            };
            if settled {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(format!(
                    "{} kept changing for {}ms",
                    page,
                    timeout.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn screenshot(&self, target: &ScreenshotTarget) -> Result<Vec<u8>, DriverError> {
        let mut world = self.world.lock();
        let label = match target {
            ScreenshotTarget::Page { page, .. } => {
                world.page_state(&page.id)?;
                page.to_string()
            }
            ScreenshotTarget::Element(element) => {
                let index = world.resolve(element)?;
                world.label(index)
            }
        };
        world.events.push(StubEvent::Screenshot { target: label });
        Ok(STUB_PNG.to_vec())
    }

    async fn activate(&self, page: &PageHandle) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        world.page_state(&page.id)?;
        world.events.push(StubEvent::Activate {
            page: page.id.clone(),
        });
        Ok(())
    }

    async fn close(&self, page: &PageHandle) -> Result<(), DriverError> {
        let mut world = self.world.lock();
        world.page_state(&page.id)?;
        if let Some(state) = world.pages.get_mut(&page.id) {
            state.closed = true;
        }
        world.events.push(StubEvent::Close {
            page: page.id.clone(),
        });
        Ok(())
    }

    async fn wait_open(
        &self,
        page: &PageHandle,
        trigger: &ElementHandle,
        timeout: Duration,
    ) -> Result<PageHandle, DriverError> {
        let mut world = self.world.lock();
        world.page_state(&page.id)?;
        let index = world.resolve(trigger)?;
        world.click(index).ok_or_else(|| {
            DriverError::timeout(format!(
                "no new tab opened from {} within {}ms",
                page,
                timeout.as_millis()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_with(page: StubPage) -> (StubDriver, PageHandle) {
        let driver = StubDriver::new();
        let handle = driver.add_page(page);
        (driver, handle)
    }

    #[tokio::test]
    async fn locate_respects_element_scope() {
        let (driver, page) = driver_with(
            StubPage::new("stub://list")
                .node(StubNode::new(".row").child(StubNode::new(".cell").text("a")))
                .node(StubNode::new(".row").child(StubNode::new(".cell").text("b"))),
        );
        let rows = driver.locate_all(Scope::Page(&page), ".row").await.unwrap();
        assert_eq!(rows.len(), 2);

        let cell = driver
            .locate(Scope::Element(&rows[1]), ".cell")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(driver.text(&cell).await.unwrap(), "b");
        assert_eq!(driver.parent_of(&cell).await.unwrap(), Some(rows[1].clone()));
    }

    #[tokio::test]
    async fn reload_windows_control_presence() {
        let (driver, page) = driver_with(
            StubPage::new("stub://race")
                .node(StubNode::new("#spinner").until_reloads(1))
                .node(StubNode::new("#ready").after_reloads(1)),
        );
        assert!(driver.locate(Scope::Page(&page), "#ready").await.unwrap().is_none());
        assert!(driver.locate(Scope::Page(&page), "#spinner").await.unwrap().is_some());

        driver.reload(&page).await.unwrap();
        assert_eq!(driver.reload_count(&page), 1);
        assert!(driver.locate(Scope::Page(&page), "#ready").await.unwrap().is_some());
        assert!(driver.locate(Scope::Page(&page), "#spinner").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delayed_nodes_are_found_by_waiting() {
        let (driver, page) = driver_with(
            StubPage::new("stub://slow")
                .node(StubNode::new("#late").appear_after(Duration::from_millis(150))),
        );
        assert!(driver.locate(Scope::Page(&page), "#late").await.unwrap().is_none());
        let found = driver
            .wait_element(Scope::Page(&page), "#late", Duration::from_secs(2))
            .await;
        assert!(found.is_ok());

        let missing = driver
            .wait_element(Scope::Page(&page), "#never", Duration::from_millis(120))
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn frames_scope_their_own_document() {
        let (driver, page) = driver_with(
            StubPage::new("stub://frames")
                .node(StubNode::new("#outside"))
                .node(StubNode::new("iframe").frame(vec![StubNode::new("#inside")])),
        );
        assert!(driver.locate(Scope::Page(&page), "#inside").await.unwrap().is_none());

        let frame = driver
            .locate(Scope::Page(&page), "iframe")
            .await
            .unwrap()
            .unwrap();
        let inner = driver.frame_of(&frame).await.unwrap();
        assert!(inner.is_frame());
        assert!(driver.locate(Scope::Page(&inner), "#inside").await.unwrap().is_some());
        assert!(driver.locate(Scope::Page(&inner), "#outside").await.unwrap().is_none());

        let outside = driver
            .locate(Scope::Page(&page), "#outside")
            .await
            .unwrap()
            .unwrap();
        assert!(driver.frame_of(&outside).await.is_err());
    }

    #[tokio::test]
    async fn clicking_an_opener_creates_a_tab() {
        let (driver, page) = driver_with(
            StubPage::new("stub://home")
                .node(StubNode::new("a.popup").opens(StubPage::new("stub://popup"))),
        );
        let link = driver
            .locate(Scope::Page(&page), "a.popup")
            .await
            .unwrap()
            .unwrap();
        let opened = driver
            .wait_open(&page, &link, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(driver.current_url(&opened).await.unwrap(), "stub://popup");
        assert_eq!(driver.open_pages().len(), 2);

        driver.close(&opened).await.unwrap();
        assert_eq!(driver.open_pages().len(), 1);
        assert!(driver.activate(&opened).await.is_err());
    }

    #[tokio::test]
    async fn input_appends_unless_cleared() {
        let (driver, page) = driver_with(
            StubPage::new("stub://form").node(StubNode::new("input").attr("value", "old")),
        );
        let input = driver
            .locate(Scope::Page(&page), "input")
            .await
            .unwrap()
            .unwrap();
        driver.input_text(&input, "-more", false).await.unwrap();
        assert_eq!(driver.value_of(&input).as_deref(), Some("old-more"));
        driver.input_text(&input, "new", true).await.unwrap();
        assert_eq!(driver.value_of(&input).as_deref(), Some("new"));
        assert_eq!(
            driver.property(&input, "value").await.unwrap(),
            Value::String("new".into())
        );
    }
}
