//! Turning a step's selector (or the inherited element) into the element it acts on.

use cdp_adapter::{ElementHandle, PageDriver};
use tracing::debug;

use crate::{errors::ActionError, types::ExecCtx};

/// Element a step operates on.
///
/// With a non-empty selector the element is awaited inside [`ExecCtx::scope`] until the
/// step deadline; without one the inherited element is used as-is.
pub async fn resolve_target(
    driver: &dyn PageDriver,
    ctx: &ExecCtx,
    selector: Option<&str>,
    step: &str,
) -> Result<ElementHandle, ActionError> {
    match selector.map(str::trim).filter(|s| !s.is_empty()) {
        Some(selector) => {
            debug!(action_id = %ctx.action_id, selector, "resolving target");
            let element = driver
                .wait_element(ctx.scope(), selector, ctx.remaining_time())
                .await
                .map_err(|err| {
                    if err.is_not_found() {
                        ActionError::NotFound(format!("failed to find element: {}", selector))
                    } else {
                        ActionError::from(err)
                    }
                })?;
            Ok(element)
        }
        None => ctx.require_element(step).cloned(),
    }
}
