//! Input+Enter primitive - type into a search-like input and submit it

use cdp_adapter::{ElementHandle, PageDriver};
use tabflow_core_types::StepValue;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ExecCtx};

/// Input types accepted as text-like; a missing `type` attribute means `text`.
const TEXT_INPUT_TYPES: &[&str] = &["text", "search"];

const DEFAULT_INPUT_SELECTOR: &str = "input";

/// Execute input+enter primitive
///
/// Steps:
/// 1. Poll the step scope for the first visible text-like input matching `selector`
/// 2. Clear it and type `text`
/// 3. Press Enter on it
pub async fn execute_input_enter(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: Option<&str>,
    text: &str,
) -> Result<StepValue, ActionError> {
    let selector = selector
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_INPUT_SELECTOR);

    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector,
        text_length = text.len(),
        "Executing input+enter primitive"
    );

    let driver = primitives.page_driver();
    let input = find_text_input(driver, ctx, selector).await?;

    debug!(element = %input, "typing");
    driver.input_text(&input, text, true).await?;
    driver.press_enter(&input).await?;

    Ok(StepValue::from(text))
}

async fn find_text_input(
    driver: &dyn PageDriver,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ElementHandle, ActionError> {
    loop {
        for candidate in driver.locate_all(ctx.scope(), selector).await? {
            if is_text_input(driver, &candidate).await? {
                return Ok(candidate);
            }
        }
        if ctx.is_timeout() {
            return Err(ActionError::NotFound(format!(
                "no visible text input matches '{}'",
                selector
            )));
        }
        sleep(cdp_adapter::POLL_INTERVAL).await;
    }
}

async fn is_text_input(
    driver: &dyn PageDriver,
    candidate: &ElementHandle,
) -> Result<bool, ActionError> {
    let kind = driver
        .attribute(candidate, "type")
        .await?
        .map(|kind| kind.to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string());
    if !TEXT_INPUT_TYPES.contains(&kind.as_str()) {
        return Ok(false);
    }
    Ok(driver.is_visible(candidate).await?)
}
