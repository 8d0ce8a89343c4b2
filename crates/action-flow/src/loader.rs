//! Plan documents (JSON or YAML) to step trees
//!
//! ```yaml
//! url: https://example.com
//! timeout: 30s
//! actions:
//!   - kind: RaceElement
//!     name: find
//!     success: ["#ok"]
//!     failure: ["#blocked"]
//!     max_retries: 2
//!     next:
//!       - { kind: Text, name: title }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{ElementFilter, ScreenshotRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::FlowError;
use crate::types::*;

/// Settle threshold used by `WaitDomStable` nodes without `diff`
const DEFAULT_SETTLE_DIFF: f64 = 0.1;

/// Duration written as seconds or as a humantime string (`"1500ms"`, `"2m"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(f64),
    Text(String),
}

impl DurationValue {
    pub fn to_duration(&self) -> Result<Duration, FlowError> {
        match self {
            DurationValue::Seconds(secs) if secs.is_finite() && *secs >= 0.0 => {
                Ok(Duration::from_secs_f64(*secs))
            }
            DurationValue::Seconds(secs) => Err(FlowError::Configuration(format!(
                "invalid duration: {}",
                secs
            ))),
            DurationValue::Text(text) => parse_duration_text(text),
        }
    }
}

fn parse_duration_text(text: &str) -> Result<Duration, FlowError> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<f64>() {
        return DurationValue::Seconds(secs).to_duration();
    }
    humantime::parse_duration(text)
        .map_err(|err| FlowError::Configuration(format!("invalid duration '{}': {}", text, err)))
}

/// Root of a plan document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DurationValue>,

    #[serde(default)]
    pub actions: Vec<StepNode>,
}

/// One node of a plan document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepNode {
    #[serde(alias = "action")]
    pub kind: String,

    /// Defaults to the kind tag
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DurationValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<StepNode>,

    /// Kind-specific parameters
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StepNode {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn step_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.kind.trim()
        } else {
            self.name.trim()
        }
    }

    /// `value` as a string, numbers included.
    pub fn value_str(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(Value::as_bool)
    }

    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    /// A string list parameter; a single string counts as a one-item list.
    pub fn extra_strings(&self, key: &str) -> Vec<String> {
        match self.extra.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(item)) => vec![item.clone()],
            _ => Vec::new(),
        }
    }

    fn selector_or_value(&self) -> Option<String> {
        self.selector
            .clone()
            .or_else(|| self.value_str())
            .map(|selector| selector.trim().to_string())
            .filter(|selector| !selector.is_empty())
    }

    fn timeout(&self) -> Result<Option<Duration>, FlowError> {
        self.timeout.as_ref().map(DurationValue::to_duration).transpose()
    }

    fn value_duration(&self) -> Result<Option<Duration>, FlowError> {
        match &self.value {
            Some(Value::Number(number)) => number
                .as_f64()
                .map(|secs| DurationValue::Seconds(secs).to_duration())
                .transpose(),
            Some(Value::String(text)) => parse_duration_text(text).map(Some),
            _ => Ok(None),
        }
    }
}

/// Builds a step from a node of a kind the loader does not know
pub type StepConstructor = Arc<dyn Fn(&StepNode) -> Option<StepSpec> + Send + Sync>;

/// Caller-owned constructors for custom kinds, keyed by kind tag
#[derive(Clone, Default)]
pub struct StepRegistry {
    constructors: HashMap<String, StepConstructor>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: &str, constructor: F) -> &mut Self
    where
        F: Fn(&StepNode) -> Option<StepSpec> + Send + Sync + 'static,
    {
        self.constructors
            .insert(normalize_kind(kind), Arc::new(constructor));
        self
    }

    pub fn with<F>(mut self, kind: &str, constructor: F) -> Self
    where
        F: Fn(&StepNode) -> Option<StepSpec> + Send + Sync + 'static,
    {
        self.register(kind, constructor);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&StepConstructor> {
        self.constructors.get(&normalize_kind(kind))
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("StepRegistry").field("kinds", &kinds).finish()
    }
}

/// Converts plan documents into [`Plan`]s
#[derive(Debug, Clone, Default)]
pub struct PlanLoader {
    registry: StepRegistry,
}

impl PlanLoader {
    pub fn new(registry: StepRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Reads a plan file; `.json` files are parsed as JSON, everything else as YAML.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Plan, FlowError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| {
            FlowError::Configuration(format!("cannot read plan {}: {}", path.display(), err))
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            self.from_json(&source)
        } else {
            self.from_yaml(&source)
        }
    }

    pub fn from_json(&self, source: &str) -> Result<Plan, FlowError> {
        let document: PlanDocument = serde_json::from_str(source)
            .map_err(|err| FlowError::Configuration(format!("invalid plan document: {}", err)))?;
        self.plan(&document)
    }

    pub fn from_yaml(&self, source: &str) -> Result<Plan, FlowError> {
        let document: PlanDocument = serde_yaml::from_str(source)
            .map_err(|err| FlowError::Configuration(format!("invalid plan document: {}", err)))?;
        self.plan(&document)
    }

    pub fn plan(&self, document: &PlanDocument) -> Result<Plan, FlowError> {
        if document.url.trim().is_empty() {
            return Err(FlowError::Configuration("plan URL is empty".to_string()));
        }
        let steps = self.steps(&document.actions)?;
        if steps.is_empty() {
            return Err(FlowError::Configuration("plan has no steps".to_string()));
        }
        let mut plan = Plan::new(document.url.trim(), steps);
        plan.timeout = document
            .timeout
            .as_ref()
            .map(DurationValue::to_duration)
            .transpose()?;
        Ok(plan)
    }

    /// Parses sibling nodes. Nodes of unknown kinds are dropped.
    pub fn steps(&self, nodes: &[StepNode]) -> Result<Vec<StepSpec>, FlowError> {
        let mut steps = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(step) = self.step(node)? {
                steps.push(step);
            }
        }
        Ok(steps)
    }

    fn step(&self, node: &StepNode) -> Result<Option<StepSpec>, FlowError> {
        let mut step = match builtin(node)? {
            Some(kind) => StepSpec::new(node.step_name(), kind),
            None => match self.registry.get(&node.kind).and_then(|build| build(node)) {
                Some(step) => step,
                None => {
                    warn!(kind = %node.kind, name = %node.name, "dropping step of unknown kind");
                    return Ok(None);
                }
            },
        };

        if step.timeout.is_none() {
            step.timeout = node.timeout()?;
        }
        if step.children.is_empty() {
            step.children = self.steps(&node.next)?;
        }
        debug!(name = %step.name, kind = step.kind.name(), children = step.children.len(), "step loaded");
        Ok(Some(step))
    }
}

/// Lowercased tag without `_` and `-`.
pub fn normalize_kind(kind: &str) -> String {
    kind.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn builtin(node: &StepNode) -> Result<Option<StepKind>, FlowError> {
    let missing = |what: &str| {
        FlowError::Configuration(format!(
            "{} step '{}' needs {}",
            node.kind,
            node.step_name(),
            what
        ))
    };

    let kind = match normalize_kind(&node.kind).as_str() {
        "click" => StepKind::Click {
            selector: node.selector_or_value(),
        },
        "clicknewpage" => StepKind::ClickNewPage {
            selector: node.selector_or_value(),
        },
        "text" => StepKind::Text {
            selector: node.selector_or_value(),
        },
        "inputenter" | "input" => StepKind::InputEnter {
            selector: node.selector.clone(),
            text: node.value_str().ok_or_else(|| missing("a text value"))?,
        },
        "sleep" => StepKind::Sleep(
            node.value_duration()?
                .or(node.timeout()?)
                .ok_or_else(|| missing("a duration"))?,
        ),
        "screenshot" | "screenshotfullpage" => StepKind::Screenshot(ScreenshotRequest {
            selector: node.selector.clone(),
            file: node
                .extra_str("file")
                .map(str::to_string)
                .or_else(|| node.value_str()),
            full_page: node.extra_bool("full_page").unwrap_or(false)
                || normalize_kind(&node.kind) == "screenshotfullpage",
        }),
        "waitdomstable" => StepKind::WaitDomStable {
            diff: node
                .extra_f64("diff")
                .or_else(|| node.value.as_ref().and_then(Value::as_f64))
                .unwrap_or(DEFAULT_SETTLE_DIFF),
        },
        "elements" | "collection" => StepKind::Elements {
            selector: node.selector_or_value().ok_or_else(|| missing("a selector"))?,
            filters: ElementFilter::parse_all(&node.extra_strings("filters")),
        },
        "conditionalelement" | "conditional" => StepKind::ConditionalElement {
            selector: node.selector_or_value().ok_or_else(|| missing("a selector"))?,
        },
        "switchframe" | "frame" => StepKind::SwitchFrame {
            selector: node.selector_or_value(),
        },
        "raceelement" | "race" => {
            let race = RaceSpec {
                success: node.extra_strings("success"),
                failure: node.extra_strings("failure"),
                max_retries: node
                    .extra
                    .get("max_retries")
                    .and_then(Value::as_u64)
                    .map(|retries| u32::try_from(retries).unwrap_or(u32::MAX))
                    .unwrap_or(0),
                timeout: node.timeout()?,
            };
            if race.success.is_empty() && race.failure.is_empty() {
                return Err(missing("success or failure selectors"));
            }
            StepKind::RaceElement(race)
        }
        "activatepage" => StepKind::ActivatePage,
        "closepage" => StepKind::ClosePage,
        "settimeout" => StepKind::SetTimeout(
            node.value_duration()?
                .or(node.timeout()?)
                .ok_or_else(|| missing("a duration"))?,
        ),
        _ => return Ok(None),
    };
    Ok(Some(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r##"
url: https://example.com/search
timeout: 45s
actions:
  - kind: InputEnter
    name: search
    value: rust
  - kind: wait_dom_stable
    name: settle
    diff: 0.05
  - kind: RaceElement
    name: results
    success: ["#results"]
    failure: ["#captcha"]
    max_retries: 2
    timeout: 1500ms
    next:
      - kind: Elements
        name: rows
        selector: .row
        filters: [".title=*rust*", "broken"]
        next:
          - { action: text, name: title, selector: .title }
          - { kind: Hover, name: hover }
"##;

    #[test]
    fn yaml_plan_builds_the_step_tree() {
        let plan = PlanLoader::default().from_yaml(PLAN).unwrap();
        assert_eq!(plan.url, "https://example.com/search");
        assert_eq!(plan.timeout, Some(Duration::from_secs(45)));

        let names: Vec<_> = plan.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["search", "settle", "results"]);
        assert!(matches!(
            &plan.steps[0].kind,
            StepKind::InputEnter { selector: None, text } if text == "rust"
        ));
        assert!(matches!(plan.steps[1].kind, StepKind::WaitDomStable { diff } if diff == 0.05));

        let race = &plan.steps[2];
        match &race.kind {
            StepKind::RaceElement(race) => {
                assert_eq!(race.success, ["#results"]);
                assert_eq!(race.failure, ["#captcha"]);
                assert_eq!(race.max_retries, 2);
                assert_eq!(race.timeout, Some(Duration::from_millis(1500)));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let rows = &race.children[0];
        assert!(matches!(
            &rows.kind,
            StepKind::Elements { selector, filters } if selector == ".row" && filters.len() == 1
        ));
        // the unknown Hover node is dropped
        assert_eq!(rows.children.len(), 1);
        assert_eq!(rows.children[0].name, "title");
    }

    #[test]
    fn registry_builds_custom_kinds() {
        let registry = StepRegistry::new().with("hover", |node: &StepNode| {
            Some(StepSpec::new(node.step_name(), StepKind::ActivatePage))
        });
        let plan = PlanLoader::new(registry).from_yaml(PLAN).unwrap();
        let rows = &plan.steps[2].children[0];
        let names: Vec<_> = rows.children.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["title", "hover"]);
    }

    #[test]
    fn json_plans_and_duration_forms() {
        let plan = PlanLoader::default()
            .from_json(
                r#"{"url": "https://example.com", "actions": [
                    {"kind": "Sleep", "name": "pause", "value": 1.5},
                    {"kind": "set-timeout", "name": "slow", "value": "2m"},
                    {"kind": "ScreenshotFullPage", "name": "shot"}
                ]}"#,
            )
            .unwrap();
        assert!(matches!(plan.steps[0].kind, StepKind::Sleep(d) if d == Duration::from_millis(1500)));
        assert!(matches!(plan.steps[1].kind, StepKind::SetTimeout(d) if d == Duration::from_secs(120)));
        match &plan.steps[2].kind {
            StepKind::Screenshot(request) => {
                assert!(request.full_page);
                assert!(request.file.is_none());
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(plan.timeout, None);
    }

    #[test]
    fn missing_required_parts_are_configuration_errors() {
        let loader = PlanLoader::default();
        let err = loader
            .from_yaml("url: https://example.com\nactions:\n  - { kind: Elements, name: list }\n")
            .unwrap_err();
        assert!(err.is_configuration());

        let err = loader.from_yaml("url: ''\nactions:\n  - { kind: Click, name: go }\n").unwrap_err();
        assert!(err.is_configuration());

        let err = loader
            .from_yaml("url: https://example.com\nactions:\n  - { kind: Teleport, name: go }\n")
            .unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn kind_tags_ignore_case_and_separators() {
        assert_eq!(normalize_kind("Wait_DOM-Stable"), "waitdomstable");
        assert_eq!(normalize_kind("click_new_page"), normalize_kind("ClickNewPage"));
    }

    #[test]
    fn load_file_picks_the_format_from_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("plan.json");
        std::fs::write(
            &json,
            r#"{"url": "https://example.com", "actions": [{"kind": "Click", "name": "go", "selector": "a"}]}"#,
        )
        .unwrap();
        let plan = PlanLoader::default().load_file(&json).unwrap();
        assert_eq!(plan.steps[0].name, "go");

        let missing = dir.path().join("absent.yaml");
        assert!(PlanLoader::default().load_file(&missing).unwrap_err().is_configuration());
    }
}
