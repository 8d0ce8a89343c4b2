//! Element-collection and conditional-element primitives

use cdp_adapter::Scope;
use tabflow_core_types::StepValue;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    filters::{passes, ElementFilter},
    primitives::DefaultActionPrimitives,
    types::ExecCtx,
};

/// Execute element-collection primitive
///
/// Waits for the first match of `selector` in the step scope, then collects every
/// match that passes `filters`. An empty collection is a not-found error.
pub async fn execute_elements(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: &str,
    filters: &[ElementFilter],
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector,
        filters = filters.len(),
        "Executing elements primitive"
    );

    let selector = selector.trim();
    if selector.is_empty() {
        return Err(ActionError::MissingContext(
            "element collection needs a selector".to_string(),
        ));
    }

    let driver = primitives.page_driver();
    let scope = ctx.scope();
    driver
        .wait_element(scope, selector, ctx.remaining_time())
        .await
        .map_err(|err| {
            if err.is_not_found() {
                ActionError::NotFound(format!("failed to find element: {}", selector))
            } else {
                ActionError::from(err)
            }
        })?;

    let mut kept = Vec::new();
    for element in driver.locate_all(scope, selector).await? {
        if passes(filters, driver, &element).await? {
            kept.push(element);
        }
    }
    debug!(selector, kept = kept.len(), "collection filtered");

    if kept.is_empty() {
        return Err(ActionError::NotFound(format!(
            "no element matching '{}' passed the filters",
            selector
        )));
    }
    Ok(StepValue::from(kept))
}

/// Execute conditional-element primitive
///
/// Looks for `selector` under the parent of the inherited element. A missing parent or
/// sibling yields `Null`, not an error.
pub async fn execute_conditional_element(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector,
        "Executing conditional-element primitive"
    );

    let element = ctx.require_element("ConditionalElement")?;
    let driver = primitives.page_driver();
    let Some(parent) = driver.parent_of(element).await? else {
        return Ok(StepValue::Null);
    };
    let sibling = driver.locate(Scope::Element(&parent), selector).await?;
    Ok(sibling.map(StepValue::from).unwrap_or_default())
}
