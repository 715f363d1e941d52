//! Failure taxonomy for a pipeline run.
//!
//! Only `FatalPrecondition` stops a run. Every other variant is scoped to the
//! item being processed: it is logged, the item is abandoned, and the run
//! moves on.
use crate::stage::StageKind;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(
        "required asset missing at {}: place the background ambience file there before running",
        .path.display()
    )]
    FatalPrecondition { path: PathBuf },

    #[error("{stage} stage failed: {cause}")]
    StageExecution { stage: StageKind, cause: String },

    #[error(
        "{stage} stage timed out after {}s waiting for {}",
        .waited.as_secs(),
        .path.display()
    )]
    StageTimeout {
        stage: StageKind,
        path: PathBuf,
        waited: Duration,
    },

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Whether the error aborts the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::FatalPrecondition { .. })
    }

    /// Short machine-readable code for summaries.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::FatalPrecondition { .. } => "fatal_precondition",
            PipelineError::StageExecution { .. } => "stage_execution_failure",
            PipelineError::StageTimeout { .. } => "stage_timeout",
            PipelineError::Unexpected(_) => "unexpected_failure",
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
