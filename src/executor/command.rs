//! External command collaborators.
//!
//! A stage command is an argv template from the config. It is split once with
//! shell-words and every argument has its `{placeholder}`s substituted, so a
//! path with spaces stays a single argument.
use super::{AmbienceMixer, SpeechSynthesizer, StageRequest, VideoRenderer};
use crate::config::CommandSpec;
use crate::util::truncate_bytes;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

const MAX_STDERR_BYTES: usize = 2_000;

/// Placeholder name and the value it expands to.
pub(super) type Bindings = Vec<(&'static str, String)>;

/// Placeholders every stage command may use.
pub(super) fn request_bindings(request: &StageRequest) -> Bindings {
    vec![
        ("{identity}", request.identity.as_str().to_string()),
        ("{input}", path_arg(&request.input)),
        ("{output}", path_arg(&request.output)),
        ("{text_dir}", path_arg(&request.text_dir)),
        ("{audio_dir}", path_arg(&request.audio_dir)),
        ("{mix_dir}", path_arg(&request.mix_dir)),
        ("{video_dir}", path_arg(&request.video_dir)),
        ("{ambience}", path_arg(&request.ambience)),
    ]
}

/// Replace the value bound to `key`, or add it.
pub(super) fn bind(bindings: &mut Bindings, key: &'static str, value: String) {
    match bindings.iter_mut().find(|(name, _)| *name == key) {
        Some(slot) => slot.1 = value,
        None => bindings.push((key, value)),
    }
}

/// Split a template and substitute placeholders argument by argument.
pub(super) fn expand(template: &str, bindings: &[(&'static str, String)]) -> Result<Vec<String>> {
    let argv = shell_words::split(template).with_context(|| format!("parse command: {template}"))?;
    if argv.is_empty() {
        return Err(anyhow!("command is empty"));
    }
    Ok(argv
        .into_iter()
        .map(|arg| {
            bindings
                .iter()
                .fold(arg, |arg, (key, value)| arg.replace(key, value))
        })
        .collect())
}

fn locate(request: &StageRequest, argv: &[String]) -> Result<PathBuf> {
    which::which(&argv[0])
        .with_context(|| format!("locate {} command `{}`", request.stage, argv[0]))
}

/// Run an expanded command to completion and fail on a non-zero exit.
pub(super) fn run_checked(request: &StageRequest, argv: &[String], cwd: Option<&Path>) -> Result<()> {
    let program = locate(request, argv)?;
    let mut command = Command::new(&program);
    command
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let output = command
        .output()
        .with_context(|| format!("run {}", program.display()))?;
    tracing::info!(
        stage = %request.stage,
        item = %request.identity,
        program = %argv[0],
        elapsed_ms = start.elapsed().as_millis() as u64,
        status = %output.status,
        "stage command finished"
    );
    if !output.status.success() {
        let stderr = truncate_bytes(&output.stderr, MAX_STDERR_BYTES);
        return Err(anyhow!(
            "{} exited with {}: {}",
            argv[0],
            output.status,
            stderr.trim()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    spec: CommandSpec,
}

impl CommandCollaborator {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    /// Expand the template for one request.
    pub fn argv(&self, request: &StageRequest) -> Result<Vec<String>> {
        expand(&self.spec.command, &request_bindings(request))
            .with_context(|| format!("{} command", request.stage))
    }

    fn run(&self, request: &StageRequest) -> Result<()> {
        let argv = self.argv(request)?;
        if let Some(parent) = request.output.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        if !self.spec.detach {
            return run_checked(request, &argv, None);
        }

        let program = locate(request, &argv)?;
        let mut child = Command::new(&program)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", program.display()))?;
        tracing::info!(
            stage = %request.stage,
            item = %request.identity,
            pid = child.id(),
            "detached stage command started"
        );
        // Reap in the background; completion is judged from the artifact.
        thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

pub(super) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl SpeechSynthesizer for CommandCollaborator {
    fn synthesize(&self, request: &StageRequest) -> Result<()> {
        self.run(request)
    }
}

impl AmbienceMixer for CommandCollaborator {
    fn mix(&self, request: &StageRequest) -> Result<()> {
        self.run(request)
    }
}

impl VideoRenderer for CommandCollaborator {
    fn render(&self, request: &StageRequest) -> Result<()> {
        self.run(request)
    }
}
