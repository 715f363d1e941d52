//! Workflow init step.
//!
//! Creates the stage directories and writes a `sermons.json` stub so a fresh
//! root only needs its ambience and background assets.
use crate::cli::{GlobalArgs, InitArgs};
use crate::config::{config_stub, PipelineConfig};
use crate::layout::PipelineLayout;
use crate::util::display_path;
use anyhow::{anyhow, Context, Result};
use std::fs;

pub fn run_init(global: &GlobalArgs, args: &InitArgs) -> Result<()> {
    let layout = PipelineLayout::new(global.root.clone());
    layout.ensure_dirs()?;

    let config_path = layout.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let stub = config_stub()?;
    fs::write(&config_path, stub.as_bytes())
        .with_context(|| format!("write {}", config_path.display()))?;
    tracing::info!(config = %config_path.display(), "config stub written");
    println!("Wrote {}", config_path.display());

    if !layout.ambience_path().is_file() {
        println!(
            "Next: place the background ambience at {}",
            display_path(&layout.ambience_path(), Some(layout.root()))
        );
    }
    let background = layout.root().join(PipelineConfig::default().video.background);
    if !background.is_file() {
        println!(
            "Next: place the caption background at {}",
            display_path(&background, Some(layout.root()))
        );
    }
    Ok(())
}
