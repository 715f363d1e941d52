//! Drives every work item through the stage sequence.
//!
//! Items are processed one at a time. For each item the coordinator starts at
//! the first missing stage and runs every stage after it in order: execute the
//! collaborator, then confirm the artifact with the readiness waiter. A failure
//! abandons only the current item. The only error that escapes `run` is a
//! missing ambience asset (or a setup failure before any item is touched).
use crate::config::StagePolicies;
use crate::error::PipelineError;
use crate::executor::{ExecOutcome, StageExecutor, StageRequest};
use crate::identity::ItemIdentity;
use crate::layout::PipelineLayout;
use crate::probe::probe_all;
use crate::readiness::{
    Baseline, ConsoleHeartbeat, FileReadinessWaiter, ReadinessPolicy, WaitObserver, WaitOutcome,
};
use crate::stage::{ItemState, StageKind, StageStatus};
use crate::util::display_path;
use anyhow::Result;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Generate and process exactly one new item, ignoring the backlog.
    pub force_new: bool,
}

/// Final result for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Done,
    Abandoned {
        stage: StageKind,
        error: PipelineError,
    },
}

impl ItemOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ItemOutcome::Done)
    }
}

/// Status the coordinator left one stage in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    /// `None` only when text generation failed before an item existed.
    pub identity: Option<ItemIdentity>,
    /// Stages confirmed during this run, in order.
    pub stages_run: Vec<StageKind>,
    /// Every stage this run attempted, with the status it ended in.
    pub stages: Vec<StageRecord>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub items: Vec<ItemReport>,
    pub completed: usize,
    pub abandoned: usize,
    /// Item created by this run, if any.
    pub generated: Option<ItemIdentity>,
}

impl RunReport {
    fn push(&mut self, item: ItemReport) {
        if item.outcome.is_done() {
            self.completed += 1;
        } else {
            self.abandoned += 1;
        }
        self.items.push(item);
    }
}

pub struct PipelineCoordinator {
    layout: PipelineLayout,
    executor: StageExecutor,
    waiter: FileReadinessWaiter,
    policies: StagePolicies,
    observer: Box<dyn WaitObserver>,
}

impl PipelineCoordinator {
    pub fn new(
        layout: PipelineLayout,
        executor: StageExecutor,
        waiter: FileReadinessWaiter,
        policies: StagePolicies,
    ) -> Self {
        Self {
            layout,
            executor,
            waiter,
            policies,
            observer: Box::new(ConsoleHeartbeat::default()),
        }
    }

    /// Replace the console heartbeat.
    pub fn with_observer(mut self, observer: Box<dyn WaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Process the backlog, or one new item when forced or idle.
    pub fn run(&mut self, options: RunOptions) -> Result<RunReport> {
        self.layout.ensure_dirs()?;
        let ambience = self.layout.ambience_path();
        if !ambience.is_file() {
            let err = PipelineError::FatalPrecondition { path: ambience };
            tracing::error!(code = err.code(), "{err}");
            return Err(err.into());
        }

        let probe = probe_all(&self.layout)?;
        let queue: Vec<(ItemIdentity, StageKind)> = probe
            .unprocessed()
            .into_iter()
            .filter_map(|item| Some((item.identity.clone(), item.first_missing()?)))
            .collect();

        let mut report = RunReport::default();
        if options.force_new || queue.is_empty() {
            tracing::info!(
                force_new = options.force_new,
                backlog = queue.len(),
                "generating a new item"
            );
            let item = self.process_new();
            report.generated = item.identity.clone();
            report.push(item);
        } else {
            tracing::info!(items = queue.len(), "processing unfinished items");
            for (identity, first_missing) in queue {
                let item = self.process_item(identity, ItemProgress::at(first_missing));
                report.push(item);
            }
        }

        tracing::info!(
            completed = report.completed,
            abandoned = report.abandoned,
            "run complete"
        );
        Ok(report)
    }

    fn process_new(&mut self) -> ItemReport {
        let mut progress = ItemProgress::at(StageKind::TextGenerated);
        eprintln!("=== {}: composing a new item ===", StageKind::TextGenerated);
        progress.begin();
        match self.run_text_stage() {
            Ok(identity) => {
                progress.confirm();
                self.process_item(identity, progress)
            }
            Err(error) => {
                progress.fail(error);
                progress.into_report(None)
            }
        }
    }

    fn process_item(&mut self, identity: ItemIdentity, mut progress: ItemProgress) -> ItemReport {
        if let Some(first) = progress.state.stage() {
            tracing::info!(item = %identity, from = %first, "processing item");
        }
        while let Some(stage) = progress.state.stage() {
            eprintln!("=== {stage}: {identity} ===");
            progress.begin();
            match self.run_stage(&identity, stage) {
                Ok(()) => progress.confirm(),
                Err(error) => progress.fail(error),
            }
        }
        if progress.state == ItemState::Done {
            tracing::info!(item = %identity, "item done");
        }
        progress.into_report(Some(identity))
    }

    fn run_text_stage(&mut self) -> Result<ItemIdentity, PipelineError> {
        let stage = StageKind::TextGenerated;
        let policy = self.policies.for_stage(stage);
        let mut last_error = None;
        for attempt in 1..=policy.max_attempts {
            tracing::info!(
                stage = %stage,
                attempt,
                max_attempts = policy.max_attempts,
                "stage start"
            );
            let executor = &self.executor;
            let layout = &self.layout;
            let path = match guarded(|| executor.generate_text(layout)) {
                Ok(ExecOutcome::Generated(path)) => path,
                Ok(ExecOutcome::Started) => {
                    last_error = Some(execution_error(stage, "text generator returned no path"));
                    continue;
                }
                Ok(ExecOutcome::Failed(cause)) => {
                    last_error = Some(execution_error(stage, &cause));
                    continue;
                }
                Err(error) => {
                    last_error = Some(error);
                    continue;
                }
            };
            let Some(identity) = self.layout.identity_from_artifact(stage, &path) else {
                let cause = format!(
                    "{} is not a text artifact in {}",
                    path.display(),
                    self.layout.text_dir().display()
                );
                last_error = Some(execution_error(stage, &cause));
                continue;
            };
            let confirmed = self.confirm(
                stage,
                &path,
                policy.readiness,
                &Baseline::absent(),
                policy.timeout(),
            );
            match confirmed {
                Ok(()) => return Ok(identity),
                Err(error) => last_error = Some(error),
            }
        }
        Err(last_error.unwrap_or_else(|| no_attempts(stage)))
    }

    fn run_stage(
        &mut self,
        identity: &ItemIdentity,
        stage: StageKind,
    ) -> Result<(), PipelineError> {
        let request = StageRequest::new(&self.layout, stage, identity).ok_or_else(|| {
            PipelineError::Unexpected(format!("{stage} stage has no downstream request"))
        })?;
        if !request.input.is_file() {
            return Err(execution_error(
                stage,
                &format!("input artifact {} is missing", request.input.display()),
            ));
        }

        let policy = self.policies.for_stage(stage);
        let baseline = Baseline::capture(&request.output);
        // A stale artifact already has a stable size; only a newer mtime proves a rewrite.
        let readiness = match policy.readiness {
            ReadinessPolicy::SizeStable if baseline.existed() => ReadinessPolicy::Modification,
            other => other,
        };

        let mut last_error = None;
        for attempt in 1..=policy.max_attempts {
            tracing::info!(
                item = %identity,
                stage = %stage,
                attempt,
                max_attempts = policy.max_attempts,
                ?readiness,
                "stage start"
            );
            let executor = &self.executor;
            match guarded(|| executor.execute(&request)) {
                Ok(ExecOutcome::Started | ExecOutcome::Generated(_)) => {}
                Ok(ExecOutcome::Failed(cause)) => {
                    last_error = Some(execution_error(stage, &cause));
                    continue;
                }
                Err(error) => {
                    last_error = Some(error);
                    continue;
                }
            }
            let confirmed =
                self.confirm(stage, &request.output, readiness, &baseline, policy.timeout());
            match confirmed {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::debug!(item = %identity, stage = %stage, attempt, "{error}");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| no_attempts(stage)))
    }

    fn confirm(
        &mut self,
        stage: StageKind,
        path: &Path,
        readiness: ReadinessPolicy,
        baseline: &Baseline,
        timeout: Duration,
    ) -> Result<(), PipelineError> {
        match self
            .waiter
            .wait(path, readiness, baseline, timeout, self.observer.as_mut())
        {
            WaitOutcome::Ready { waited } => {
                eprintln!(
                    "created {}",
                    display_path(path, Some(self.layout.root()))
                );
                tracing::info!(
                    stage = %stage,
                    path = %path.display(),
                    waited_ms = waited.as_millis() as u64,
                    "stage confirmed"
                );
                Ok(())
            }
            WaitOutcome::TimedOut { waited } => Err(PipelineError::StageTimeout {
                stage,
                path: path.to_path_buf(),
                waited,
            }),
            WaitOutcome::NotProduced => Err(execution_error(
                stage,
                &format!("{} was not produced", path.display()),
            )),
        }
    }
}

/// Per-item state machine plus the stage statuses it has passed through.
#[derive(Debug)]
struct ItemProgress {
    state: ItemState,
    stages_run: Vec<StageKind>,
    stages: Vec<StageRecord>,
    failure: Option<(StageKind, PipelineError)>,
}

impl ItemProgress {
    /// Progress for an item whose next stage is `stage`.
    fn at(stage: StageKind) -> Self {
        Self {
            state: ItemState::for_stage(stage),
            stages_run: Vec::new(),
            stages: Vec::new(),
            failure: None,
        }
    }

    /// Mark the current stage in progress while it executes and waits.
    fn begin(&mut self) {
        if let Some(stage) = self.state.stage() {
            self.stages.push(StageRecord {
                stage,
                status: StageStatus::InProgress,
            });
        }
    }

    fn set_current(&mut self, status: StageStatus) {
        if let Some(record) = self.stages.last_mut() {
            record.status = status;
        }
    }

    fn confirm(&mut self) {
        self.set_current(StageStatus::Complete);
        if let Some(stage) = self.state.stage() {
            self.stages_run.push(stage);
        }
        self.state = self.state.advance();
    }

    fn fail(&mut self, error: PipelineError) {
        self.set_current(StageStatus::Failed);
        let stage = self.state.stage().unwrap_or(StageKind::TextGenerated);
        self.failure = Some((stage, error));
        self.state = ItemState::Abandoned;
    }

    fn into_report(self, identity: Option<ItemIdentity>) -> ItemReport {
        let outcome = match (self.state, self.failure) {
            (ItemState::Abandoned, Some((stage, error))) => {
                let item = identity.as_ref().map(ToString::to_string);
                tracing::warn!(
                    item = item.as_deref().unwrap_or("<new>"),
                    stage = %stage,
                    code = error.code(),
                    "item abandoned: {error}"
                );
                ItemOutcome::Abandoned { stage, error }
            }
            (ItemState::Done, _) => ItemOutcome::Done,
            (state, _) => ItemOutcome::Abandoned {
                stage: state.stage().unwrap_or(StageKind::TextGenerated),
                error: PipelineError::Unexpected(format!("item stopped in state {state:?}")),
            },
        };
        ItemReport {
            identity,
            stages_run: self.stages_run,
            stages: self.stages,
            outcome,
        }
    }
}

fn execution_error(stage: StageKind, cause: &str) -> PipelineError {
    PipelineError::StageExecution {
        stage,
        cause: cause.to_string(),
    }
}

fn no_attempts(stage: StageKind) -> PipelineError {
    PipelineError::Unexpected(format!("{stage} stage made no attempts"))
}

/// Run a collaborator call, turning a panic into an unexpected failure.
fn guarded<T>(call: impl FnOnce() -> T) -> Result<T, PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .map_err(|payload| PipelineError::Unexpected(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("collaborator panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("collaborator panicked: {message}")
    } else {
        "collaborator panicked".to_string()
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
