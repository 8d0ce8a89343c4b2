//! Page lifecycle primitives - activate and close tabs

use tabflow_core_types::StepValue;
use tracing::info;

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ExecCtx};

/// Brings the inherited page (or the run's page) to the front. The page stays the
/// step value so children keep working in it.
pub async fn execute_activate_page(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
) -> Result<StepValue, ActionError> {
    let page = ctx.target_page().top();
    info!(action_id = %ctx.action_id, path = %ctx.path, page = %page, "Activating page");
    primitives.page_driver().activate(&page).await?;
    Ok(StepValue::from(page))
}

pub async fn execute_close_page(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
) -> Result<StepValue, ActionError> {
    let page = ctx.target_page().top();
    info!(action_id = %ctx.action_id, path = %ctx.path, page = %page, "Closing page");
    primitives.page_driver().close(&page).await?;
    Ok(StepValue::Null)
}
