use anyhow::Result;
use cdp_adapter::config::detect_chrome_executable;
use serde::Serialize;

use super::context::CliContext;
use super::output::render_structured;
use crate::config::Config;

#[derive(Serialize)]
struct InfoReport<'a> {
    version: &'static str,
    build_date: &'static str,
    git_commit: &'static str,
    config_path: Option<String>,
    chrome: Option<String>,
    config: &'a Config,
}

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let report = InfoReport {
        version: env!("CARGO_PKG_VERSION"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        git_commit: option_env!("GIT_HASH").unwrap_or("unknown"),
        config_path: ctx.config_path().map(|path| path.display().to_string()),
        chrome: config
            .browser
            .executable
            .clone()
            .or_else(detect_chrome_executable)
            .map(|path| path.display().to_string()),
        config,
    };

    if let Some(text) = render_structured(&report, ctx.output())? {
        println!("{}", text);
        return Ok(());
    }

    println!("tabflow System Information");
    println!("==========================");
    println!("Version: {}", report.version);
    println!("Build Date: {}", report.build_date);
    println!("Git Commit: {}", report.git_commit);
    println!();

    println!("Configuration:");
    println!(
        "- Source: {}",
        report.config_path.as_deref().unwrap_or("(defaults)")
    );
    println!("- Headless: {}", config.browser.headless);
    if let Some(endpoint) = &config.browser.ws_endpoint {
        println!("- Browser endpoint: {}", endpoint);
    }
    println!(
        "- Chrome executable: {}",
        report.chrome.as_deref().unwrap_or("not found")
    );
    println!("- Default step timeout: {}s", config.default_timeout_secs);
    println!(
        "- Race: +{}ms per retry, poll {}ms, settle diff {}",
        config.race.widen_per_retry_ms, config.race.poll_interval_ms, config.race.settle_diff
    );
    println!("- Output Directory: {}", config.output_dir.display());

    Ok(())
}
