//! Workflow check step.
//!
//! Verifies what a run will need before it starts: the ambience asset, the
//! collaborator programs, the background image and the API credentials.
use super::PipelineContext;
use crate::cli::{CheckArgs, GlobalArgs};
use crate::config::{CommandSpec, LmBackendConfig, PipelineConfig};
use crate::layout::PipelineLayout;
use crate::util::display_path;
use anyhow::{anyhow, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFinding {
    pub subject: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckFinding {
    fn ok(subject: &'static str, detail: String) -> Self {
        Self {
            subject,
            ok: true,
            detail,
        }
    }

    fn problem(subject: &'static str, detail: String) -> Self {
        Self {
            subject,
            ok: false,
            detail,
        }
    }
}

pub fn run_check(global: &GlobalArgs, _args: &CheckArgs) -> Result<()> {
    let ctx = PipelineContext::load(global)?;
    let config_source = match &ctx.config_path {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    };
    println!("{:<8} ok  {config_source}", "config");

    let findings = check_findings(&ctx.layout, &ctx.config);
    for finding in &findings {
        let mark = if finding.ok { "ok" } else { "!!" };
        println!("{:<8} {mark}  {}", finding.subject, finding.detail);
    }
    let problems = findings.iter().filter(|finding| !finding.ok).count();
    if problems > 0 {
        return Err(anyhow!("{problems} check(s) failed"));
    }
    Ok(())
}

pub fn check_findings(layout: &PipelineLayout, config: &PipelineConfig) -> Vec<CheckFinding> {
    let mut findings = Vec::new();

    let ambience = display_path(&layout.ambience_path(), Some(layout.root()));
    findings.push(if layout.ambience_path().is_file() {
        CheckFinding::ok("ambience", ambience)
    } else {
        CheckFinding::problem("ambience", format!("missing {ambience}"))
    });

    findings.push(match config.resolved_lm_backend() {
        LmBackendConfig::Http {
            model, api_key_env, ..
        } => {
            if env::var_os(&api_key_env).is_some() {
                CheckFinding::ok("text", format!("{model} ({api_key_env} set)"))
            } else {
                CheckFinding::problem("text", format!("{api_key_env} is not set"))
            }
        }
        LmBackendConfig::Command { command } => program_finding("text", &command),
    });

    let commands = &config.collaborators;
    findings.push(match &commands.speech {
        Some(CommandSpec { command, .. }) => program_finding("speech", command),
        None => {
            let speech = &config.speech;
            if env::var_os(&speech.api_key_env).is_some() {
                CheckFinding::ok(
                    "speech",
                    format!("{} voice {} ({} set)", speech.model, speech.voice, speech.api_key_env),
                )
            } else {
                CheckFinding::problem("speech", format!("{} is not set", speech.api_key_env))
            }
        }
    });
    findings.push(match &commands.mix {
        Some(CommandSpec { command, .. }) => program_finding("mix", command),
        None => CheckFinding::problem("mix", "not configured (set collaborators.mix)".to_string()),
    });
    match &commands.video {
        Some(CommandSpec { command, .. }) => findings.push(program_finding("video", command)),
        None => {
            findings.push(program_finding("video", &config.video.render_command));
            findings.push(program_finding("captions", &config.video.transcribe_command));
            let background = layout.root().join(&config.video.background);
            let shown = display_path(&background, Some(layout.root()));
            findings.push(if background.is_file() {
                CheckFinding::ok("backdrop", shown)
            } else {
                CheckFinding::problem("backdrop", format!("missing {shown}"))
            });
        }
    }
    findings
}

fn program_finding(subject: &'static str, command: &str) -> CheckFinding {
    let program = shell_words::split(command)
        .ok()
        .and_then(|argv| argv.into_iter().next());
    let Some(program) = program else {
        return CheckFinding::problem(subject, format!("unparsable command `{command}`"));
    };
    match which::which(&program) {
        Ok(path) => CheckFinding::ok(subject, path.display().to_string()),
        Err(_) => CheckFinding::problem(subject, format!("`{program}` not found on PATH")),
    }
}
