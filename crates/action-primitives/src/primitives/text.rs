//! Text primitive - read the text content of an element

use tabflow_core_types::StepValue;
use tracing::info;

use crate::{
    errors::ActionError, locator::resolve_target, primitives::DefaultActionPrimitives,
    types::ExecCtx,
};

pub async fn execute_text(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: Option<&str>,
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector = ?selector,
        "Executing text primitive"
    );

    let driver = primitives.page_driver();
    let element = resolve_target(driver, ctx, selector, "Text").await?;
    let text = driver.text(&element).await?;
    Ok(StepValue::from(text.trim().to_string()))
}
