//! Flow engine: walks a step tree depth-first and records the result tree

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use action_locator::{RacePolicy, RaceResolver};
use action_primitives::{ActionPrimitives, DefaultActionPrimitives, ExecCtx};
use async_recursion::async_recursion;
use async_trait::async_trait;
use cdp_adapter::{PageDriver, PageHandle};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::types::*;

/// Flow executor trait
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Navigate `page` to the plan URL and run its steps.
    ///
    /// Configuration problems are returned as `Err`; step failures end up in the report.
    async fn start(&self, plan: &Plan, page: &PageHandle) -> Result<FlowReport, FlowError>;

    /// Run a root sibling group against `page`.
    async fn run(&self, page: &PageHandle, steps: &[StepSpec]) -> StepRun;

    /// Static checks of a plan: URL, steps, sibling name uniqueness at every level.
    fn validate_plan(&self, plan: &Plan) -> Result<(), FlowError>;
}

/// Default flow executor
pub struct FlowEngine {
    primitives: Arc<dyn ActionPrimitives>,
    resolver: RaceResolver,
    default_timeout: Duration,
}

impl FlowEngine {
    pub fn new(primitives: Arc<dyn ActionPrimitives>, policy: RacePolicy) -> Self {
        let resolver = RaceResolver::new(primitives.driver(), policy);
        Self {
            primitives,
            resolver,
            default_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Engine over `driver` with the default primitives and race policy.
    pub fn with_driver(driver: Arc<dyn PageDriver>) -> Self {
        Self::new(
            Arc::new(DefaultActionPrimitives::with_driver(driver)),
            RacePolicy::default(),
        )
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn primitives(&self) -> &dyn ActionPrimitives {
        self.primitives.as_ref()
    }

    pub fn driver(&self) -> Arc<dyn PageDriver> {
        self.primitives.driver()
    }

    pub fn resolver(&self) -> &RaceResolver {
        &self.resolver
    }

    /// Standard continuation: run `steps` as children of `parent`, within the same run.
    pub async fn run_under(
        &self,
        page: &PageHandle,
        steps: &[StepSpec],
        parent: &StepResult,
        flow: &mut FlowContext,
    ) -> StepRun {
        self.run_group(page, steps, Some(parent), flow).await
    }

    /// Run one sibling group. Errors come back unchanged so the parent records the
    /// child's own message.
    #[async_recursion]
    async fn run_group<'p>(
        &self,
        page: &PageHandle,
        steps: &[StepSpec],
        parent: Option<&'p StepResult>,
        flow: &mut FlowContext,
    ) -> StepRun {
        let mut results = Vec::with_capacity(steps.len());
        if let Err(err) = check_unique(steps) {
            return StepRun::failed(results, err);
        }

        for step in steps {
            let path = match parent {
                Some(parent) => format!("{}_{}", parent.path, step.name),
                None => step.name.clone(),
            };
            debug!(path = %path, kind = step.kind.name(), "executing step");

            let mut ctx = ExecCtx::new(page.clone(), path.clone(), step.timeout.unwrap_or(flow.timeout));
            if let Some(parent) = parent {
                ctx = ctx.inherit(parent.value.clone(), parent.path.clone());
            }

            let mut result = StepResult::new(step.name.clone(), path);
            let mut failure = match step.kind.execute(self, &ctx, flow).await {
                Ok(value) => {
                    result.value = value;
                    None
                }
                Err(err) => Some(err),
            };

            if failure.is_none() {
                if let Some(validator) = &step.validator {
                    let driver = self.driver();
                    if let Err(reason) = validator.validate(driver.as_ref(), page, &result).await {
                        failure = Some(FlowError::Validation(reason));
                    }
                }
            }

            if failure.is_none() && !step.children.is_empty() {
                failure = self.continue_step(page, step, &mut result, flow).await.err();
            }

            if let Some(err) = &failure {
                result.error = err.to_string();
                warn!(path = %result.path, error = %err, "step failed");
            }
            results.push(result);

            if let Some(err) = failure {
                return StepRun::failed(results, err);
            }
        }
        StepRun::completed(results)
    }

    /// Continue below a finished step; a sequence value fans out once per item.
    async fn continue_step(
        &self,
        page: &PageHandle,
        step: &StepSpec,
        result: &mut StepResult,
        flow: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let Some(items) = result.value.as_sequence().map(<[_]>::to_vec) else {
            let run = step
                .kind
                .continue_children(self, page, &step.children, result, flow)
                .await;
            result.children = run.results;
            return run.error.map_or(Ok(()), Err);
        };

        debug!(path = %result.path, items = items.len(), "fanning out");
        for (index, item) in items.into_iter().enumerate() {
            let mut item_result =
                StepResult::new(step.name.clone(), format!("{}_{}", result.path, index + 1));
            item_result.value = item;
            let run = step
                .kind
                .continue_children(self, page, &step.children, &item_result, flow)
                .await;
            result.children.extend(run.results);
            if let Some(err) = run.error {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FlowExecutor for FlowEngine {
    async fn start(&self, plan: &Plan, page: &PageHandle) -> Result<FlowReport, FlowError> {
        if plan.url.trim().is_empty() {
            return Err(FlowError::Configuration("plan URL is empty".to_string()));
        }
        if plan.steps.is_empty() {
            return Err(FlowError::Configuration("plan has no steps".to_string()));
        }

        let timeout = plan.timeout.unwrap_or(self.default_timeout);
        info!(url = %plan.url, steps = plan.steps.len(), "starting plan");
        let report = FlowReport::new(plan.url.clone());

        let ctx = ExecCtx::new(page.clone(), "navigate", timeout);
        if let Err(err) = self.primitives.navigate(&ctx, &plan.url).await {
            let err = FlowError::from(err);
            warn!(url = %plan.url, error = %err, "plan navigation failed");
            return Ok(report.with_error(&err).finish());
        }

        let mut flow = FlowContext::new(timeout);
        let run = self.run_root(page, &plan.steps, &mut flow).await;
        let report = report.with_run(run).finish();
        info!(
            url = %plan.url,
            success = report.is_success(),
            latency_ms = report.latency_ms.unwrap_or_default(),
            "plan finished"
        );
        Ok(report)
    }

    async fn run(&self, page: &PageHandle, steps: &[StepSpec]) -> StepRun {
        let mut flow = FlowContext::new(self.default_timeout);
        self.run_root(page, steps, &mut flow).await
    }

    fn validate_plan(&self, plan: &Plan) -> Result<(), FlowError> {
        check_plan(plan)
    }
}

/// Static checks a plan must pass before it runs: a URL, at least one step and
/// unique, non-empty sibling names at every level.
pub fn check_plan(plan: &Plan) -> Result<(), FlowError> {
    if plan.url.trim().is_empty() {
        return Err(FlowError::Configuration("plan URL is empty".to_string()));
    }
    if plan.steps.is_empty() {
        return Err(FlowError::Configuration("plan has no steps".to_string()));
    }
    check_names(&plan.steps)
}

/// [`check_plan`] plus rules the engine only reports once a step has run, such as
/// children under a kind that cannot continue.
pub fn lint_plan(plan: &Plan) -> Result<(), FlowError> {
    check_plan(plan)?;
    check_continuations(&plan.steps)
}

impl FlowEngine {
    async fn run_root(
        &self,
        page: &PageHandle,
        steps: &[StepSpec],
        flow: &mut FlowContext,
    ) -> StepRun {
        let mut run = self.run_group(page, steps, None, flow).await;
        if let Some(err) = run.error.take() {
            run.error = Some(match deepest_failure(&run.results) {
                Some(failed) => FlowError::StepFailed {
                    path: failed.path.clone(),
                    reason: Box::new(err),
                },
                None => err,
            });
        }
        run
    }
}

fn check_unique(steps: &[StepSpec]) -> Result<(), FlowError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(FlowError::Configuration(format!(
                "step name must be unique: {}",
                step.name
            )));
        }
    }
    Ok(())
}

fn check_names(steps: &[StepSpec]) -> Result<(), FlowError> {
    check_unique(steps)?;
    for step in steps {
        if step.name.trim().is_empty() {
            return Err(FlowError::Configuration("step without a name".to_string()));
        }
        check_names(&step.children)?;
    }
    Ok(())
}

fn check_continuations(steps: &[StepSpec]) -> Result<(), FlowError> {
    for step in steps {
        if !step.children.is_empty() && !step.kind.supports_children() {
            return Err(FlowError::Configuration(format!(
                "{} step '{}' cannot have child steps",
                step.kind.name(),
                step.name
            )));
        }
        check_continuations(&step.children)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::ElementFilter;
    use cdp_adapter::stub::{StubDriver, StubEvent, StubNode, StubPage};
    use cdp_adapter::ElementHandle;
    use tabflow_core_types::StepValue;

    fn fast_engine(stub: &Arc<StubDriver>) -> FlowEngine {
        FlowEngine::new(
            Arc::new(DefaultActionPrimitives::with_driver(stub.clone())),
            RacePolicy {
                widen_per_retry: Duration::from_millis(10),
                poll_interval: Duration::from_millis(10),
                settle_diff: 0.1,
            },
        )
        .with_default_timeout(Duration::from_millis(300))
    }

    fn listing() -> StubPage {
        StubPage::new("stub://list")
            .node(StubNode::new(".item").text("one").child(StubNode::new(".title").text("first")))
            .node(StubNode::new(".item").text("two").child(StubNode::new(".title").text("second")))
            .node(StubNode::new(".item").text("three"))
    }

    fn elements(selector: &str) -> StepKind {
        StepKind::Elements {
            selector: selector.into(),
            filters: Vec::new(),
        }
    }

    fn text(selector: &str) -> StepKind {
        StepKind::Text {
            selector: Some(selector.into()),
        }
    }

    fn clicks(stub: &StubDriver) -> usize {
        stub.events()
            .iter()
            .filter(|event| matches!(event, StubEvent::Click { .. }))
            .count()
    }

    #[tokio::test]
    async fn duplicate_sibling_names_run_nothing() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://a").node(StubNode::new("#go")));
        let engine = fast_engine(&stub);
        let steps = vec![
            StepSpec::new("a", StepKind::Click { selector: Some("#go".into()) }),
            StepSpec::new("a", StepKind::Click { selector: Some("#go".into()) }),
        ];

        let run = engine.run(&page, &steps).await;
        assert!(run.results.is_empty());
        assert!(run.error.as_ref().is_some_and(FlowError::is_configuration));
        assert_eq!(clicks(&stub), 0);
    }

    #[tokio::test]
    async fn first_failure_stops_remaining_siblings() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://form")
                .node(StubNode::new("#first"))
                .node(StubNode::new("#third")),
        );
        let engine = fast_engine(&stub);
        let steps = vec![
            StepSpec::new("first", StepKind::Click { selector: Some("#first".into()) }),
            StepSpec::new("second", StepKind::Click { selector: Some("#missing".into()) })
                .with_timeout(Duration::from_millis(50)),
            StepSpec::new("third", StepKind::Click { selector: Some("#third".into()) }),
        ];

        let run = engine.run(&page, &steps).await;
        let names: Vec<_> = run.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(run.results[0].is_success());
        assert!(run.results[1].error.contains("#missing"));
        assert_eq!(clicks(&stub), 1);

        match run.error {
            Some(FlowError::StepFailed { path, reason }) => {
                assert_eq!(path, "second");
                assert!(matches!(*reason, FlowError::NotFound(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn collection_without_children_keeps_every_handle() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(listing());
        let engine = fast_engine(&stub);

        let run = engine.run(&page, &[StepSpec::new("list", elements(".item"))]).await;
        assert!(run.is_success());
        assert_eq!(run.results.len(), 1);
        let list = &run.results[0];
        assert_eq!(list.value.as_sequence().map(|items| items.len()), Some(3));
        assert!(list.children.is_empty());
    }

    #[tokio::test]
    async fn fan_out_builds_indexed_paths() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(listing());
        let engine = fast_engine(&stub);
        let steps = vec![StepSpec::new("list", elements(".item"))
            .child(StepSpec::new("label", StepKind::Text { selector: None }))];

        let run = engine.run(&page, &steps).await;
        assert!(run.is_success());
        let list = &run.results[0];
        let paths: Vec<_> = list.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["list_1_label", "list_2_label", "list_3_label"]);
        assert_eq!(list.children[1].value.as_str(), Some("two"));
    }

    #[tokio::test]
    async fn fan_out_stops_at_the_failing_item() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(listing());
        let engine = fast_engine(&stub);
        let steps = vec![
            StepSpec::new("list", elements(".item"))
                .child(StepSpec::new("title", text(".title")).with_timeout(Duration::from_millis(50))),
            StepSpec::new("after", StepKind::ActivatePage),
        ];

        let run = engine.run(&page, &steps).await;
        assert_eq!(run.results.len(), 1);
        let list = &run.results[0];
        let paths: Vec<_> = list.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["list_1_title", "list_2_title", "list_3_title"]);
        assert!(list.children[..2].iter().all(StepResult::is_success));
        assert!(!list.children[2].is_success());
        assert_eq!(list.error, list.children[2].error);

        match run.error {
            Some(FlowError::StepFailed { path, .. }) => assert_eq!(path, "list_3_title"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn race_step_reloads_past_a_blocking_element() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://race")
                .node(StubNode::new("#blocked").until_reloads(1))
                .node(StubNode::new("#ok").after_reloads(1)),
        );
        let engine = fast_engine(&stub);
        let steps = vec![StepSpec::new(
            "find",
            StepKind::RaceElement(RaceSpec {
                success: vec!["#ok".into()],
                failure: vec!["#blocked".into()],
                max_retries: 2,
                timeout: None,
            }),
        )];

        let run = engine.run(&page, &steps).await;
        assert!(run.is_success(), "{:?}", run.error);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].name, "find");
        assert_eq!(run.results[0].error, "");
        assert!(run.results[0].extract_element().is_some());
        assert_eq!(stub.reload_count(&page), 1);
    }

    #[tokio::test]
    async fn race_step_with_duplicate_selectors_is_a_configuration_error() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://race").node(StubNode::new("#ok")));
        let engine = fast_engine(&stub);
        let steps = vec![StepSpec::new(
            "find",
            StepKind::RaceElement(RaceSpec {
                success: vec!["#ok".into()],
                failure: vec!["#ok".into()],
                max_retries: 1,
                timeout: None,
            }),
        )];

        let run = engine.run(&page, &steps).await;
        assert!(run.error.as_ref().is_some_and(FlowError::is_configuration));
        assert_eq!(run.results[0].error, "Configuration error: selector must be unique: #ok");
    }

    #[tokio::test]
    async fn validator_failure_marks_the_step() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://t").node(StubNode::new("h1").text("Welcome")));
        let engine = fast_engine(&stub);
        let steps = vec![
            StepSpec::new("heading", text("h1")).with_validator(
                |_page: &PageHandle, result: &StepResult| -> Result<(), String> {
                    match result.value.as_str() {
                        Some("Goodbye") => Ok(()),
                        other => Err(format!("unexpected heading {:?}", other)),
                    }
                },
            ),
            StepSpec::new("never", StepKind::ActivatePage),
        ];

        let run = engine.run(&page, &steps).await;
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].value.as_str(), Some("Welcome"));
        assert!(run.results[0].error.starts_with("Validation failed"));
    }

    #[tokio::test]
    async fn children_inherit_the_parent_element() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://cards")
                .node(StubNode::new(".card").child(StubNode::new("a.more").text("details")))
                .node(StubNode::new("a.more").text("outside")),
        );
        let engine = fast_engine(&stub);
        let steps = vec![StepSpec::new(
            "card",
            StepKind::RaceElement(RaceSpec {
                success: vec![".card".into()],
                ..RaceSpec::default()
            }),
        )
        .child(StepSpec::new("link", text("a.more")))];

        let run = engine.run(&page, &steps).await;
        assert!(run.is_success(), "{:?}", run.error);
        let link = run.results[0].find("card_link").unwrap();
        assert_eq!(link.value.as_str(), Some("details"));
    }

    #[tokio::test]
    async fn race_under_a_click_searches_the_whole_page() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://form")
                .node(StubNode::new("#submit").text("Send"))
                .node(StubNode::new("#ok").text("Thanks")),
        );
        let engine = fast_engine(&stub);
        let steps = vec![StepSpec::new(
            "submit",
            StepKind::Click {
                selector: Some("#submit".into()),
            },
        )
        .child(StepSpec::new(
            "find",
            StepKind::RaceElement(RaceSpec {
                success: vec!["#ok".into()],
                failure: vec!["#blocked".into()],
                max_retries: 1,
                timeout: None,
            }),
        ))];

        let run = engine.run(&page, &steps).await;
        assert!(run.is_success(), "{:?}", run.error);
        let found = run.results[0].find("submit_find").unwrap();
        let element = found.extract_element().unwrap();
        assert_eq!(stub.text(element).await.unwrap(), "Thanks");
        assert_eq!(stub.reload_count(&page), 0);
    }

    #[tokio::test]
    async fn terminal_step_with_children_fails_with_unsupported() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://t").node(StubNode::new("h1").text("Hi")));
        let engine = fast_engine(&stub);
        let steps = vec![StepSpec::new("heading", text("h1"))
            .child(StepSpec::new("inner", StepKind::ActivatePage))];

        let run = engine.run(&page, &steps).await;
        assert_eq!(run.results[0].value.as_str(), Some("Hi"));
        assert!(run.results[0].children.is_empty());
        assert!(matches!(
            run.error.as_ref().map(FlowError::root_cause),
            Some(FlowError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn set_timeout_applies_to_later_siblings() {
        struct ReportTimeout;

        #[async_trait]
        impl CustomAction for ReportTimeout {
            async fn execute(
                &self,
                _driver: Arc<dyn PageDriver>,
                ctx: &ExecCtx,
            ) -> Result<StepValue, FlowError> {
                Ok(StepValue::scalar(ctx.timeout.as_millis() as u64))
            }
        }

        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://t"));
        let engine = fast_engine(&stub);
        let custom = || StepKind::Custom {
            name: "ReportTimeout".into(),
            action: Arc::new(ReportTimeout),
        };
        let steps = vec![
            StepSpec::new("before", custom()),
            StepSpec::new("slow", StepKind::SetTimeout(Duration::from_secs(7))),
            StepSpec::new("after", custom()),
        ];

        let results = engine.run(&page, &steps).await.into_result().unwrap();
        assert_eq!(results[0].value, StepValue::scalar(300u64));
        assert_eq!(results[2].value, StepValue::scalar(7000u64));
    }

    #[tokio::test]
    async fn start_navigates_then_runs() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(listing());
        let engine = fast_engine(&stub);
        let plan = Plan::new("stub://list", vec![StepSpec::new("list", elements(".item"))]);

        let report = engine.start(&plan, &page).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.results.len(), 1);
        assert!(report.finished_at.is_some());
        assert!(matches!(
            stub.events().first(),
            Some(StubEvent::Navigate { url, .. }) if url == "stub://list"
        ));
    }

    #[test]
    fn start_rejects_empty_plans() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(listing());
        let engine = fast_engine(&stub);

        tokio_test::block_on(async {
            let err = engine.start(&Plan::new("", vec![]), &page).await.unwrap_err();
            assert!(err.is_configuration());
            let err = engine
                .start(&Plan::new("stub://list", vec![]), &page)
                .await
                .unwrap_err();
            assert!(err.is_configuration());
        });
        assert!(stub.events().is_empty());
    }

    #[test]
    fn validate_plan_checks_every_level() {
        let engine = FlowEngine::with_driver(Arc::new(StubDriver::new()));
        let nested_duplicate = Plan::new(
            "stub://x",
            vec![StepSpec::new("list", elements(".item"))
                .child(StepSpec::new("a", StepKind::ActivatePage))
                .child(StepSpec::new("a", StepKind::ActivatePage))],
        );
        assert!(engine.validate_plan(&nested_duplicate).is_err());

        let filters = ElementFilter::parse_all(&[".title=*"]);
        let ok = Plan::new(
            "stub://x",
            vec![StepSpec::new("list", StepKind::Elements { selector: ".item".into(), filters })
                .child(StepSpec::new("title", text(".title")))],
        );
        assert!(engine.validate_plan(&ok).is_ok());
    }

    #[test]
    fn children_under_terminal_steps_are_left_to_the_engine() {
        let plan = Plan::new(
            "stub://x",
            vec![StepSpec::new("heading", text("h1"))
                .child(StepSpec::new("inner", StepKind::ActivatePage))],
        );
        assert!(check_plan(&plan).is_ok());
        assert!(FlowEngine::with_driver(Arc::new(StubDriver::new()))
            .validate_plan(&plan)
            .is_ok());

        let err = lint_plan(&plan).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'heading' cannot have child steps"));
    }

    #[test]
    fn results_expose_inherited_handles() {
        let page = PageHandle::new(cdp_adapter::PageId::new());
        let element = ElementHandle::new(cdp_adapter::ElementId::new(), page.clone());
        let mut result = StepResult::new("x", "x");
        result.value = StepValue::from(element.clone());
        assert_eq!(result.extract_element(), Some(&element));
        assert!(result.extract_page().is_none());
        result.value = StepValue::from(page.clone());
        assert_eq!(result.extract_page(), Some(&page));
    }
}
