//! Navigate primitive - Navigate to URL with built-in waiting

use tabflow_core_types::StepValue;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::{ActionPrimitives, DefaultActionPrimitives},
    types::{ExecCtx, WaitTier},
};

/// Execute navigate primitive
///
/// Navigates the target page to `url` and waits until the document finished loading.
/// The navigated page becomes the step value.
pub async fn execute_navigate(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    url: &str,
) -> Result<StepValue, ActionError> {
    let url = url.trim();
    info!(
        action_id = %ctx.action_id,
        url = %url,
        "Executing navigate primitive"
    );

    if url.is_empty() {
        return Err(ActionError::MissingContext("URL cannot be empty".to_string()));
    }

    let page = ctx.target_page();
    debug!(page = %page, "issuing navigation");
    primitives
        .page_driver()
        .navigate(page, url, ctx.remaining_time())
        .await?;

    primitives
        .wait_strategy()
        .wait(primitives.driver(), page, WaitTier::Loaded, ctx.remaining_time())
        .await?;

    Ok(StepValue::from(page.clone()))
}
