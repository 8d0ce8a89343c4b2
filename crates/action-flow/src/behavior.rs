//! Execute and continue for every step kind

use action_primitives::ExecCtx;
use cdp_adapter::PageHandle;
use tabflow_core_types::StepValue;
use tracing::debug;

use crate::errors::FlowError;
use crate::executor::FlowEngine;
use crate::types::*;

impl StepKind {
    /// Performs the step against the page, reading the inherited result from `ctx`.
    pub async fn execute(
        &self,
        engine: &FlowEngine,
        ctx: &ExecCtx,
        flow: &mut FlowContext,
    ) -> Result<StepValue, FlowError> {
        let primitives = engine.primitives();
        let value = match self {
            StepKind::Click { selector } => primitives.click(ctx, selector.as_deref()).await?,
            StepKind::ClickNewPage { selector } => {
                primitives.click_new_page(ctx, selector.as_deref()).await?
            }
            StepKind::Text { selector } => primitives.text(ctx, selector.as_deref()).await?,
            StepKind::InputEnter { selector, text } => {
                primitives.input_enter(ctx, selector.as_deref(), text).await?
            }
            StepKind::Sleep(duration) => primitives.sleep(ctx, *duration).await?,
            StepKind::Screenshot(request) => primitives.screenshot(ctx, request).await?,
            StepKind::WaitDomStable { diff } => primitives.wait_dom_stable(ctx, *diff).await?,
            StepKind::Elements { selector, filters } => {
                primitives.elements(ctx, selector, filters).await?
            }
            StepKind::ConditionalElement { selector } => {
                primitives.conditional_element(ctx, selector).await?
            }
            StepKind::SwitchFrame { selector } => {
                primitives.switch_frame(ctx, selector.as_deref()).await?
            }
            StepKind::RaceElement(race) => {
                let outcome = engine
                    .resolver()
                    .race_element(
                        ctx.target_page(),
                        &race.success,
                        &race.failure,
                        race.max_retries,
                        race.timeout.unwrap_or(ctx.timeout),
                    )
                    .await?;
                StepValue::from(outcome.element)
            }
            StepKind::ActivatePage => primitives.activate_page(ctx).await?,
            StepKind::ClosePage => primitives.close_page(ctx).await?,
            StepKind::SetTimeout(timeout) => {
                debug!(path = %ctx.path, timeout_ms = timeout.as_millis() as u64, "step timeout changed");
                flow.timeout = *timeout;
                StepValue::Null
            }
            StepKind::Custom { action, .. } => action.execute(engine.driver(), ctx).await?,
        };
        Ok(value)
    }

    /// Runs `children` below `current`. Terminal kinds refuse; a conditional step only
    /// continues while its result still carries an element.
    pub async fn continue_children(
        &self,
        engine: &FlowEngine,
        page: &PageHandle,
        children: &[StepSpec],
        current: &StepResult,
        flow: &mut FlowContext,
    ) -> StepRun {
        if !self.supports_children() {
            return StepRun::failed(
                Vec::new(),
                FlowError::Unsupported(format!(
                    "{} at '{}' does not support child steps",
                    self.name(),
                    current.path
                )),
            );
        }
        if let StepKind::ConditionalElement { selector } = self {
            if current.extract_element().is_none() {
                debug!(path = %current.path, selector = %selector, "condition not met, children skipped");
                return StepRun::completed(Vec::new());
            }
        }
        engine.run_under(page, children, current, flow).await
    }
}
