//! Click primitives - plain click and click-and-follow-new-tab

use tabflow_core_types::StepValue;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    locator::resolve_target,
    primitives::{ActionPrimitives, DefaultActionPrimitives},
    types::{ExecCtx, WaitTier},
};

/// Execute click primitive
///
/// Clicks `selector` inside the step scope, or the inherited element when no selector
/// is given. The clicked element becomes the step value so children can keep working
/// inside it.
pub async fn execute_click(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: Option<&str>,
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector = ?selector,
        "Executing click primitive"
    );

    let driver = primitives.page_driver();
    let element = resolve_target(driver, ctx, selector, "Click").await?;

    debug!(element = %element, "clicking");
    driver.click(&element).await?;

    Ok(StepValue::from(element))
}

/// Execute click-new-page primitive
///
/// Clicks the target and waits for the tab it opens. The new tab is waited on until
/// loaded and becomes the step value.
pub async fn execute_click_new_page(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: Option<&str>,
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector = ?selector,
        "Executing click-new-page primitive"
    );

    let driver = primitives.page_driver();
    let element = resolve_target(driver, ctx, selector, "ClickNewPage").await?;
    let opened = driver
        .wait_open(&element.page.top(), &element, ctx.remaining_time())
        .await?;

    primitives
        .wait_strategy()
        .wait(
            primitives.driver(),
            &opened,
            WaitTier::Loaded,
            ctx.remaining_time(),
        )
        .await?;

    info!(action_id = %ctx.action_id, page = %opened, "New page opened");
    Ok(StepValue::from(opened))
}
