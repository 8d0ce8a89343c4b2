//! Screenshot primitive - capture the page or an element to a PNG file

use std::path::{Path, PathBuf};

use cdp_adapter::ScreenshotTarget;
use tabflow_core_types::StepValue;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    locator::resolve_target,
    primitives::DefaultActionPrimitives,
    types::{ExecCtx, ScreenshotRequest},
};

/// Execute screenshot primitive
///
/// Target selection: `request.selector` inside the step scope, else the inherited
/// element, else the target page (full page when requested). The file defaults to
/// `<inherited path>.png` under the output directory; relative names are resolved
/// against it as well. The written path is the step value.
pub async fn execute_screenshot(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    request: &ScreenshotRequest,
) -> Result<StepValue, ActionError> {
    info!(
        action_id = %ctx.action_id,
        path = %ctx.path,
        selector = ?request.selector,
        full_page = request.full_page,
        "Executing screenshot primitive"
    );

    let driver = primitives.page_driver();
    let target = match request.selector.as_deref() {
        Some(selector) if !selector.trim().is_empty() => {
            ScreenshotTarget::Element(resolve_target(driver, ctx, Some(selector), "Screenshot").await?)
        }
        _ => match ctx.inherited_element() {
            Some(element) => ScreenshotTarget::Element(element.clone()),
            None => ScreenshotTarget::Page {
                page: ctx.target_page().clone(),
                full_page: request.full_page,
            },
        },
    };

    let bytes = driver.screenshot(&target).await?;
    let file = output_file(primitives.output_dir(), request.file.as_deref(), ctx);
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&file, &bytes).await?;

    debug!(file = %file.display(), bytes = bytes.len(), "screenshot written");
    Ok(StepValue::from(file.to_string_lossy().into_owned()))
}

fn output_file(output_dir: &Path, file: Option<&str>, ctx: &ExecCtx) -> PathBuf {
    match file.map(str::trim).filter(|f| !f.is_empty()) {
        Some(file) => {
            let file = Path::new(file);
            if file.is_absolute() {
                file.to_path_buf()
            } else {
                output_dir.join(file)
            }
        }
        None => output_dir.join(format!("{}.png", ctx.inherited_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::stub::{StubDriver, StubEvent, StubNode, StubPage, STUB_PNG};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn derived_file_name_follows_inherited_path() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://shot").node(StubNode::new("#card")));
        let primitives =
            DefaultActionPrimitives::with_driver(stub.clone()).with_output_dir(dir.path());

        let ctx = ExecCtx::new(page.clone(), "list_2_shot", Duration::from_millis(200))
            .inherit(tabflow_core_types::StepValue::Null, "list_2");
        let value = execute_screenshot(&primitives, &ctx, &ScreenshotRequest::default())
            .await
            .unwrap();
        let written = dir.path().join("list_2.png");
        assert_eq!(value.as_str(), Some(written.to_string_lossy().as_ref()));
        assert_eq!(std::fs::read(&written).unwrap(), STUB_PNG);

        let request = ScreenshotRequest {
            selector: Some("#card".into()),
            file: Some("cards/card.png".into()),
            full_page: false,
        };
        let ctx = ExecCtx::new(page, "card", Duration::from_millis(200));
        execute_screenshot(&primitives, &ctx, &request).await.unwrap();
        assert!(dir.path().join("cards/card.png").exists());
        assert_eq!(
            stub.events().last(),
            Some(&StubEvent::Screenshot {
                target: "#card".into()
            })
        );
    }
}
