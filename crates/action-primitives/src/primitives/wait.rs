//! Wait primitives - fixed sleeps and DOM stability

use std::time::Duration;

use tabflow_core_types::StepValue;
use tracing::info;

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ExecCtx};

pub async fn execute_sleep(ctx: &ExecCtx, duration: Duration) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        duration_ms = duration.as_millis() as u64,
        "Executing sleep primitive"
    );
    tokio::time::sleep(duration).await;
    Ok(StepValue::Null)
}

/// Execute wait-dom-stable primitive
///
/// Blocks until the relative DOM change between two samples drops to `diff` or below,
/// bounded by the step timeout.
pub async fn execute_wait_dom_stable(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    diff: f64,
) -> Result<StepValue, ActionError> {
    let page = ctx.target_page();
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        page = %page,
        diff,
        "Executing wait-dom-stable primitive"
    );

    primitives
        .page_driver()
        .wait_dom_stable(page, diff, ctx.remaining_time())
        .await?;
    Ok(StepValue::Null)
}
