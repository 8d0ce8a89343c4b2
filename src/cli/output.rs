use std::fmt::Write as _;

use action_flow::{FlowReport, StepResult};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tabflow_core_types::StepValue;

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Serializes `value` for the json and yaml formats.
pub fn render_structured<T: Serialize>(value: &T, format: &OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Human => Ok(None),
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(Some)
            .context("Failed to encode JSON output"),
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map(Some)
            .context("Failed to encode YAML output"),
    }
}

pub fn render_report(report: &FlowReport, format: &OutputFormat) -> Result<String> {
    if let Some(text) = render_structured(report, format)? {
        return Ok(text);
    }

    let mut out = String::new();
    let status = if report.is_success() { "ok" } else { "failed" };
    let _ = writeln!(out, "Run {} on {}: {}", report.run_id, report.url, status);
    if let Some(latency) = report.latency_ms {
        let _ = writeln!(out, "Latency: {}ms", latency);
    }
    render_results(&report.results, 1, &mut out);
    if let Some(error) = &report.error {
        let _ = writeln!(out, "Error: {}", error);
    }
    Ok(out)
}

fn render_results(results: &[StepResult], depth: usize, out: &mut String) {
    for result in results {
        let indent = "  ".repeat(depth);
        let mark = if result.is_success() { "✓" } else { "✗" };
        let _ = write!(out, "{}{} {} = {}", indent, mark, result.path, summarize(&result.value));
        if !result.error.is_empty() {
            let _ = write!(out, " ({})", result.error);
        }
        out.push('\n');
        render_results(&result.children, depth + 1, out);
    }
}

fn summarize(value: &StepValue) -> String {
    match value {
        StepValue::Null => "-".to_string(),
        StepValue::Scalar(value) => match value.as_str() {
            Some(text) => format!("{:?}", text),
            None => value.to_string(),
        },
        StepValue::Element(element) => format!("<element {}>", element.id),
        StepValue::Page(page) => format!("<page {}>", page.id),
        StepValue::Sequence(items) => format!("[{} items]", items.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_flow::StepRun;

    #[test]
    fn human_report_indents_children() {
        let mut list = StepResult::new("list", "list");
        list.value = StepValue::Sequence(vec![StepValue::Null, StepValue::Null]);
        let mut title = StepResult::new("title", "list_1_title");
        title.value = StepValue::from("Kettle".to_string());
        list.children.push(title);

        let report = FlowReport::new("https://example.com").with_run(StepRun::completed(vec![list]));
        let text = render_report(&report, &OutputFormat::Human).unwrap();
        assert!(text.contains("  ✓ list = [2 items]"));
        assert!(text.contains("    ✓ list_1_title = \"Kettle\""));
    }

    #[test]
    fn json_report_is_parseable() {
        let report = FlowReport::new("https://example.com");
        let text = render_report(&report, &OutputFormat::Json).unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded["url"], "https://example.com");
    }
}
