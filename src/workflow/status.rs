//! Workflow status step.
//!
//! Read-only: probes the stage directories and prints per-item progress.
use super::PipelineContext;
use crate::cli::{GlobalArgs, StatusArgs};
use crate::layout::PipelineLayout;
use crate::probe::{probe_all, ItemProbe, ProbeReport};
use crate::stage::StageKind;
use crate::util::display_path;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub ambience_present: bool,
    pub total: usize,
    pub complete: usize,
    pub unprocessed: usize,
    pub items: Vec<ItemProbe>,
}

pub fn run_status(global: &GlobalArgs, args: &StatusArgs) -> Result<()> {
    let ctx = PipelineContext::load(global)?;
    let report = probe_all(&ctx.layout)?;
    let summary = build_summary(&ctx.layout, ctx.config_path, &report, args.all);
    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize status")?;
        println!("{text}");
    } else {
        print!("{}", render_summary(&ctx.layout, &summary));
    }
    Ok(())
}

pub fn build_summary(
    layout: &PipelineLayout,
    config: Option<PathBuf>,
    report: &ProbeReport,
    include_complete: bool,
) -> StatusSummary {
    let items = report
        .items
        .values()
        .filter(|item| include_complete || !item.is_complete())
        .cloned()
        .collect();
    StatusSummary {
        root: layout.root().to_path_buf(),
        config,
        ambience_present: layout.ambience_path().is_file(),
        total: report.items.len(),
        complete: report.complete_count(),
        unprocessed: report.unprocessed().len(),
        items,
    }
}

fn render_summary(layout: &PipelineLayout, summary: &StatusSummary) -> String {
    let mut out = format!(
        "{} items: {} complete, {} unprocessed\n",
        summary.total, summary.complete, summary.unprocessed
    );
    if !summary.ambience_present {
        out.push_str(&format!(
            "warning: ambience asset missing at {}\n",
            display_path(&layout.ambience_path(), Some(layout.root()))
        ));
    }
    for item in &summary.items {
        let marks = StageKind::ALL
            .iter()
            .map(|stage| {
                let mark = if item.status(*stage).is_complete() {
                    "x"
                } else {
                    " "
                };
                format!("[{mark}] {stage}")
            })
            .collect::<Vec<_>>()
            .join("  ");
        let next = match item.first_missing() {
            Some(stage) => format!("next: {stage}"),
            None => "done".to_string(),
        };
        out.push_str(&format!("  {}  {marks}  ({next})\n", item.identity));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ItemIdentity;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn summary_hides_complete_items_unless_asked() {
        let temp = TempDir::new().expect("temp dir");
        let layout = PipelineLayout::new(temp.path().to_path_buf());
        layout.ensure_dirs().expect("dirs");
        let done = ItemIdentity::from_stem("20240101_000000_faith").expect("identity");
        let pending = ItemIdentity::from_stem("20240102_000000_hope").expect("identity");
        for stage in StageKind::ALL {
            fs::write(layout.artifact_path(stage, &done), b"x").expect("write");
        }
        fs::write(layout.artifact_path(StageKind::TextGenerated, &pending), b"x").expect("write");
        let report = probe_all(&layout).expect("probe");

        let summary = build_summary(&layout, None, &report, false);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.complete, 1);
        assert_eq!(summary.unprocessed, 1);
        assert_eq!(summary.items.len(), 1);
        assert!(!summary.ambience_present);

        let text = render_summary(&layout, &summary);
        assert!(
            text.contains("warning: ambience asset missing at processed_audio/trimmed_ambience.mp3")
        );
        assert!(text.contains("20240102_000000_hope  [x] text  [ ] speech"));
        assert!(text.contains("(next: speech)"));

        let all = build_summary(&layout, None, &report, true);
        assert_eq!(all.items.len(), 2);
    }
}
