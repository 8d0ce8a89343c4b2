//! Frame-switch primitive - enter the document hosted by a frame element

use tabflow_core_types::StepValue;
use tracing::info;

use crate::{
    errors::ActionError, locator::resolve_target, primitives::DefaultActionPrimitives,
    types::ExecCtx,
};

/// The frame element is `selector` inside the step scope, or the inherited element.
/// The nested document becomes the step value, so children locate inside the frame.
pub async fn execute_switch_frame(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    selector: Option<&str>,
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector = ?selector,
        "Executing switch-frame primitive"
    );

    let driver = primitives.page_driver();
    let frame = resolve_target(driver, ctx, selector, "SwitchFrame").await?;
    let document = driver.frame_of(&frame).await?;
    Ok(StepValue::from(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::stub::{StubDriver, StubNode, StubPage};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn frame_document_scopes_later_lookups() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://frames")
                .node(StubNode::new("#login").frame(vec![StubNode::new("#user")]))
                .node(StubNode::new("#plain")),
        );
        let primitives = DefaultActionPrimitives::with_driver(stub);
        let ctx = ExecCtx::new(page.clone(), "frame", Duration::from_millis(200));

        let value = execute_switch_frame(&primitives, &ctx, Some("#login"))
            .await
            .unwrap();
        let document = value.as_page().unwrap().clone();
        assert!(document.is_frame());

        let inner = ExecCtx::new(page.clone(), "frame_user", Duration::from_millis(200))
            .inherit(value, "frame");
        assert!(crate::execute_text(&primitives, &inner, Some("#user")).await.is_ok());

        let err = execute_switch_frame(&primitives, &ctx, Some("#plain"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unsupported(_)));
    }
}
