use clap::Parser;
use sermon_pipeline::cli::{Command, RootArgs};
use sermon_pipeline::util::error_chain_message;
use sermon_pipeline::workflow;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);

    let result = match &args.command {
        Command::Run(run) => workflow::run_run(&args.global, run).map(|_| ()),
        Command::Status(status) => workflow::run_status(&args.global, status),
        Command::Init(init) => workflow::run_init(&args.global, init),
        Command::Check(check) => workflow::run_check(&args.global, check),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", error_chain_message(&err));
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout stays clean for `--json`. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
