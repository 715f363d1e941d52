//! CLI argument parsing for the sermon pipeline.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "sermons",
    version,
    about = "Resumable pipeline for narrated devotional videos",
    after_help = "Commands:\n  run      Finish unfinished items, or create a new one\n  status   Show which stages each item has completed\n  init     Create stage directories and a sermons.json stub\n  check    Validate config, collaborators and the ambience asset\n\nExamples:\n  sermons --root ~/sermons init\n  sermons --root ~/sermons run\n  sermons --root ~/sermons run --force-new --json\n  sermons --root ~/sermons status --all",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Pipeline root holding data/, audio/, processed_audio/ and videos/
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Config file (defaults to <root>/sermons.json, then the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Emit debug logs
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Status(StatusArgs),
    Init(InitArgs),
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Process unfinished items, or generate a new one")]
pub struct RunArgs {
    /// Generate and process one new item even if a backlog exists
    #[arg(long)]
    pub force_new: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show per-stage status of every item")]
pub struct StatusArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Include fully processed items
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Create the stage directories and a config stub")]
pub struct InitArgs {
    /// Overwrite an existing sermons.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Validate config, collaborators and required assets")]
pub struct CheckArgs {}
