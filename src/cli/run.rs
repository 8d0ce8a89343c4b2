use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_flow::{check_plan, FlowEngine, FlowExecutor, PlanLoader, StepRegistry};
use action_primitives::{DefaultActionPrimitives, DefaultWaitStrategy};
use anyhow::{bail, Context, Result};
use cdp_adapter::ChromiumDriver;
use clap::Args;
use tokio::fs;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::render_report;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Plan file (JSON or YAML)
    pub plan: PathBuf,

    /// Run without a visible browser window
    #[arg(long, conflicts_with = "headful")]
    pub headless: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Attach to a running browser through its DevTools websocket
    #[arg(long, value_name = "ENDPOINT")]
    pub ws: Option<String>,

    /// Step timeout in seconds, overriding plan and configuration
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Also write the result tree as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub trace_out: Option<PathBuf>,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let mut plan = PlanLoader::new(StepRegistry::new())
        .load_file(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;
    check_plan(&plan).with_context(|| format!("Invalid plan {}", args.plan.display()))?;
    if let Some(secs) = args.timeout {
        plan.timeout = Some(Duration::from_secs(secs));
    }

    let mut cdp = config.cdp_config();
    if args.headless {
        cdp.headless = true;
    }
    if args.headful {
        cdp.headless = false;
    }
    if args.ws.is_some() {
        cdp.websocket_url = args.ws.clone();
    }

    let driver = Arc::new(
        ChromiumDriver::start(cdp)
            .await
            .context("Failed to start browser")?,
    );
    let page = driver.open_page().await.context("Failed to open a tab")?;

    let primitives = DefaultActionPrimitives::new(
        driver.clone(),
        Arc::new(DefaultWaitStrategy::new(config.race.settle_diff)),
    )
    .with_output_dir(&config.output_dir);
    let engine = FlowEngine::new(Arc::new(primitives), config.race_policy())
        .with_default_timeout(config.default_timeout());

    let outcome = engine.start(&plan, &page).await;
    if let Err(err) = driver.shutdown().await {
        warn!(error = %err, "browser shutdown failed");
    }
    let report = outcome.context("Plan rejected")?;

    println!("{}", render_report(&report, ctx.output())?);

    if let Some(path) = &args.trace_out {
        let json = serde_json::to_vec_pretty(&report).context("Failed to encode trace")?;
        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write trace {}", path.display()))?;
        info!("Trace written to {}", path.display());
    }

    if let Some(error) = &report.error {
        bail!("plan failed: {}", error);
    }
    Ok(())
}
