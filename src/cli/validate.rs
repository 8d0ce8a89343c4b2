use std::fmt::Write as _;
use std::path::PathBuf;

use action_flow::{lint_plan, Plan, PlanLoader, StepRegistry, StepSpec};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::render_structured;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Plan file (JSON or YAML)
    pub plan: PathBuf,
}

/// Shape of a plan without runtime state
#[derive(Debug, Serialize)]
pub struct PlanOutline {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub steps: Vec<StepOutline>,
}

#[derive(Debug, Serialize)]
pub struct StepOutline {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepOutline>,
}

impl PlanOutline {
    pub fn of(plan: &Plan) -> Self {
        Self {
            url: plan.url.clone(),
            timeout_ms: plan.timeout.map(|timeout| timeout.as_millis() as u64),
            steps: plan.steps.iter().map(StepOutline::of).collect(),
        }
    }
}

impl StepOutline {
    pub fn of(step: &StepSpec) -> Self {
        Self {
            name: step.name.clone(),
            kind: step.kind.name().to_string(),
            children: step.children.iter().map(StepOutline::of).collect(),
        }
    }
}

pub async fn cmd_validate(args: ValidateArgs, ctx: &CliContext) -> Result<()> {
    let plan = PlanLoader::new(StepRegistry::new())
        .load_file(&args.plan)
        .with_context(|| format!("Invalid plan {}", args.plan.display()))?;
    lint_plan(&plan).with_context(|| format!("Invalid plan {}", args.plan.display()))?;
    let outline = PlanOutline::of(&plan);

    match render_structured(&outline, ctx.output())? {
        Some(text) => println!("{}", text),
        None => print!("{}", render_outline(&outline)),
    }
    Ok(())
}

fn render_outline(outline: &PlanOutline) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plan for {}", outline.url);
    fn walk(steps: &[StepOutline], depth: usize, out: &mut String) {
        for step in steps {
            let _ = writeln!(out, "{}- {} ({})", "  ".repeat(depth), step.name, step.kind);
            walk(&step.children, depth + 1, out);
        }
    }
    walk(&outline.steps, 1, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_lists_nested_steps() {
        let plan = PlanLoader::default()
            .from_yaml(
                "url: https://example.com\nactions:\n  - kind: elements\n    name: rows\n    selector: .row\n    next:\n      - { kind: text, name: title }\n",
            )
            .unwrap();
        let text = render_outline(&PlanOutline::of(&plan));
        assert_eq!(
            text,
            "Plan for https://example.com\n  - rows (Elements)\n    - title (Text)\n"
        );
    }
}
