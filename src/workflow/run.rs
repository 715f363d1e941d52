//! Workflow run step.
//!
//! Builds the coordinator from config and prints the run report.
use super::PipelineContext;
use crate::cli::{GlobalArgs, RunArgs};
use crate::coordinator::{ItemOutcome, PipelineCoordinator, RunOptions, RunReport};
use anyhow::{Context, Result};

pub fn run_run(global: &GlobalArgs, args: &RunArgs) -> Result<RunReport> {
    let ctx = PipelineContext::load(global)?;
    let mut coordinator = PipelineCoordinator::new(
        ctx.layout.clone(),
        ctx.executor(),
        ctx.config.waiter(),
        ctx.config.stages.clone(),
    );
    let report = coordinator.run(RunOptions {
        force_new: args.force_new,
    })?;

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize run report")?;
        println!("{text}");
    } else {
        print!("{}", render_report(&report));
    }
    Ok(report)
}

fn render_report(report: &RunReport) -> String {
    let mut out = format!(
        "run complete: {} done, {} abandoned\n",
        report.completed, report.abandoned
    );
    for item in &report.items {
        let name = item
            .identity
            .as_ref()
            .map(|identity| identity.to_string())
            .unwrap_or_else(|| "<new item>".to_string());
        let line = match &item.outcome {
            ItemOutcome::Done => format!("  done       {name}\n"),
            ItemOutcome::Abandoned { stage, error } => {
                format!("  abandoned  {name} at {stage}: {error}\n")
            }
        };
        out.push_str(&line);
    }
    if let Some(generated) = &report.generated {
        out.push_str(&format!("generated {generated}\n"));
    }
    out
}
