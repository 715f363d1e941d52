//! Command implementations.
//!
//! Each step loads the layout and config, then hands off to the library
//! modules. Only `run` writes stage artifacts.
mod check;
mod context;
mod init;
mod run;
mod status;

pub use check::{check_findings, run_check, CheckFinding};
pub(crate) use context::PipelineContext;
pub use init::run_init;
pub use run::run_run;
pub use status::{build_summary, run_status, StatusSummary};
