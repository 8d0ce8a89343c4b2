//! Core types for flow orchestration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{ElementFilter, ExecCtx, ScreenshotRequest};
use async_trait::async_trait;
use cdp_adapter::{ElementHandle, PageDriver, PageHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabflow_core_types::StepValue;

use crate::errors::FlowError;

/// Page default timeout applied when neither the plan nor a step sets one
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Post-condition checked after a step executed successfully.
///
/// Returning an error marks the step as failed with a validation error.
#[async_trait]
pub trait StepValidator: Send + Sync {
    async fn validate(
        &self,
        driver: &dyn PageDriver,
        page: &PageHandle,
        result: &StepResult,
    ) -> Result<(), String>;
}

#[async_trait]
impl<F> StepValidator for F
where
    F: Fn(&PageHandle, &StepResult) -> Result<(), String> + Send + Sync,
{
    async fn validate(
        &self,
        _driver: &dyn PageDriver,
        page: &PageHandle,
        result: &StepResult,
    ) -> Result<(), String> {
        self(page, result)
    }
}

/// Caller-supplied execute behaviour of a custom step kind
#[async_trait]
pub trait CustomAction: Send + Sync {
    async fn execute(
        &self,
        driver: Arc<dyn PageDriver>,
        ctx: &ExecCtx,
    ) -> Result<StepValue, FlowError>;
}

/// Parameters of a race step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceSpec {
    /// Selectors whose appearance ends the race successfully
    pub success: Vec<String>,

    /// Selectors of recognized failure states
    pub failure: Vec<String>,

    /// Reload-and-retry budget
    pub max_retries: u32,

    /// Per-attempt budget; the step timeout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// Step kinds. Each one implements execute and continue (see `behavior`).
#[derive(Clone)]
pub enum StepKind {
    Click { selector: Option<String> },
    ClickNewPage { selector: Option<String> },
    Text { selector: Option<String> },
    InputEnter { selector: Option<String>, text: String },
    Sleep(Duration),
    Screenshot(ScreenshotRequest),
    WaitDomStable { diff: f64 },
    Elements { selector: String, filters: Vec<ElementFilter> },
    ConditionalElement { selector: String },
    SwitchFrame { selector: Option<String> },
    RaceElement(RaceSpec),
    ActivatePage,
    ClosePage,
    SetTimeout(Duration),
    Custom { name: String, action: Arc<dyn CustomAction> },
}

impl StepKind {
    pub fn name(&self) -> &str {
        match self {
            StepKind::Click { .. } => "Click",
            StepKind::ClickNewPage { .. } => "ClickNewPage",
            StepKind::Text { .. } => "Text",
            StepKind::InputEnter { .. } => "InputEnter",
            StepKind::Sleep(_) => "Sleep",
            StepKind::Screenshot(_) => "Screenshot",
            StepKind::WaitDomStable { .. } => "WaitDomStable",
            StepKind::Elements { .. } => "Elements",
            StepKind::ConditionalElement { .. } => "ConditionalElement",
            StepKind::SwitchFrame { .. } => "SwitchFrame",
            StepKind::RaceElement(_) => "RaceElement",
            StepKind::ActivatePage => "ActivatePage",
            StepKind::ClosePage => "ClosePage",
            StepKind::SetTimeout(_) => "SetTimeout",
            StepKind::Custom { name, .. } => name.as_str(),
        }
    }

    /// Whether the kind hands a navigable context to child steps.
    pub fn supports_children(&self) -> bool {
        !matches!(
            self,
            StepKind::Text { .. }
                | StepKind::InputEnter { .. }
                | StepKind::Sleep(_)
                | StepKind::Screenshot(_)
                | StepKind::WaitDomStable { .. }
                | StepKind::ClosePage
                | StepKind::SetTimeout(_)
        )
    }
}

impl fmt::Debug for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Click { selector }
            | StepKind::ClickNewPage { selector }
            | StepKind::Text { selector }
            | StepKind::SwitchFrame { selector } => f
                .debug_struct(self.name())
                .field("selector", selector)
                .finish(),
            StepKind::InputEnter { selector, text } => f
                .debug_struct("InputEnter")
                .field("selector", selector)
                .field("text", text)
                .finish(),
            StepKind::Sleep(duration) | StepKind::SetTimeout(duration) => {
                f.debug_tuple(self.name()).field(duration).finish()
            }
            StepKind::Screenshot(request) => f.debug_tuple("Screenshot").field(request).finish(),
            StepKind::WaitDomStable { diff } => f
                .debug_struct("WaitDomStable")
                .field("diff", diff)
                .finish(),
            StepKind::Elements { selector, filters } => f
                .debug_struct("Elements")
                .field("selector", selector)
                .field("filters", &filters.len())
                .finish(),
            StepKind::ConditionalElement { selector } => f
                .debug_struct("ConditionalElement")
                .field("selector", selector)
                .finish(),
            StepKind::RaceElement(race) => f.debug_tuple("RaceElement").field(race).finish(),
            StepKind::ActivatePage | StepKind::ClosePage => f.write_str(self.name()),
            StepKind::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

/// One node of a plan: what to do, how to check it, what runs below it
#[derive(Clone)]
pub struct StepSpec {
    /// Unique among siblings
    pub name: String,

    pub kind: StepKind,

    /// Overrides the run's step timeout for this step
    pub timeout: Option<Duration>,

    pub validator: Option<Arc<dyn StepValidator>>,

    pub children: Vec<StepSpec>,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout: None,
            validator: None,
            children: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_validator(mut self, validator: impl StepValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_children(mut self, children: Vec<StepSpec>) -> Self {
        self.children = children;
        self
    }

    pub fn child(mut self, child: StepSpec) -> Self {
        self.children.push(child);
        self
    }
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("validator", &self.validator.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// One node of the execution trace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,

    /// `parent_name`, or `parent_index` inside a fan-out
    pub path: String,

    #[serde(default)]
    pub value: StepValue,

    /// Empty on success
    #[serde(default)]
    pub error: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepResult>,
}

impl StepResult {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Element carried by the value, if any.
    pub fn extract_element(&self) -> Option<&ElementHandle> {
        self.value.as_element()
    }

    /// Page carried by the value, if any.
    pub fn extract_page(&self) -> Option<&PageHandle> {
        self.value.as_page()
    }

    /// Depth-first lookup by path.
    pub fn find(&self, path: &str) -> Option<&StepResult> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Deepest failed result along the trailing edge of a result list.
pub fn deepest_failure(results: &[StepResult]) -> Option<&StepResult> {
    let last = results.last().filter(|result| !result.is_success())?;
    deepest_failure(&last.children).or(Some(last))
}

/// Output of one sibling group
#[derive(Debug, Default)]
pub struct StepRun {
    pub results: Vec<StepResult>,
    pub error: Option<FlowError>,
}

impl StepRun {
    pub fn completed(results: Vec<StepResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn failed(results: Vec<StepResult>, error: FlowError) -> Self {
        Self {
            results,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<StepResult>, FlowError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}

/// Mutable state of one run, shared by every step in it
#[derive(Debug, Clone)]
pub struct FlowContext {
    /// Timeout given to steps that do not set their own
    pub timeout: Duration,
}

impl FlowContext {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_TIMEOUT)
    }
}

/// A target URL plus the steps to run on it
#[derive(Debug, Clone)]
pub struct Plan {
    pub url: String,
    pub steps: Vec<StepSpec>,

    /// Step timeout for this plan; the engine default when unset
    pub timeout: Option<Duration>,
}

impl Plan {
    pub fn new(url: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            url: url.into(),
            steps,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of running a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    /// Run identifier
    pub run_id: String,

    pub url: String,

    pub results: Vec<StepResult>,

    /// Top-level error, if any step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Path of the deepest failed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_path: Option<String>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub latency_ms: Option<u64>,
}

impl FlowReport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            results: Vec::new(),
            error: None,
            failed_path: None,
            started_at: Utc::now(),
            finished_at: None,
            latency_ms: None,
        }
    }

    pub fn with_run(mut self, run: StepRun) -> Self {
        self.failed_path = deepest_failure(&run.results).map(|result| result.path.clone());
        self.error = run.error.map(|err| err.to_string());
        self.results = run.results;
        self
    }

    pub fn with_error(mut self, error: &FlowError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Stamp the finish time and latency.
    pub fn finish(mut self) -> Self {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.latency_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str, path: &str, children: Vec<StepResult>) -> StepResult {
        StepResult {
            error: "boom".into(),
            children,
            ..StepResult::new(name, path)
        }
    }

    #[test]
    fn deepest_failure_follows_trailing_failures() {
        let results = vec![
            StepResult::new("open", "open"),
            failed(
                "list",
                "list",
                vec![
                    StepResult::new("title", "list_1_title"),
                    failed("title", "list_2_title", Vec::new()),
                ],
            ),
        ];
        assert_eq!(
            deepest_failure(&results).map(|r| r.path.as_str()),
            Some("list_2_title")
        );
        assert!(deepest_failure(&results[..1]).is_none());
    }

    #[test]
    fn terminal_kinds_reject_children() {
        assert!(!StepKind::Sleep(Duration::from_secs(1)).supports_children());
        assert!(!StepKind::ClosePage.supports_children());
        assert!(StepKind::ActivatePage.supports_children());
        assert!(StepKind::RaceElement(RaceSpec::default()).supports_children());
    }

    #[test]
    fn report_serializes_the_result_tree() {
        let mut parent = StepResult::new("list", "list");
        parent.children.push(StepResult::new("title", "list_1_title"));
        let report = FlowReport::new("https://example.com")
            .with_run(StepRun::completed(vec![parent]))
            .finish();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["children"][0]["path"], "list_1_title");
        assert!(json.get("error").is_none());
        assert!(report.latency_ms.is_some());
    }
}
