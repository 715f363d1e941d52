//! Pipeline configuration.
//!
//! Loads, validates and normalizes `sermons.json` so the coordinator only sees
//! checked values. Every field has a default; a missing config file means
//! "run with defaults".
use crate::layout::PipelineLayout;
use crate::readiness::{FileReadinessWaiter, ReadinessPolicy};
use crate::stage::StageKind;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current schema version for `sermons.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Environment override that swaps the text backend for a local LM command.
pub const LM_COMMAND_ENV: &str = "SERMONS_LM_COMMAND";

/// Mixes the speech over the looped ambience at -10 dB, trimmed to the speech.
pub const DEFAULT_MIX_COMMAND: &str = "ffmpeg -y -loglevel error -i {input} -stream_loop -1 -i {ambience} -filter_complex \"[1:a]volume=-10dB[bg];[0:a][bg]amix=inputs=2:duration=first:normalize=0[out]\" -map \"[out]\" {output}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub schema_version: u32,
    /// Readiness sampling interval.
    pub poll_interval_ms: u64,
    /// Pause after a modification-based wait succeeds.
    pub grace_delay_ms: u64,
    /// Consecutive unchanged samples required by the size policy.
    pub stable_samples: u32,
    pub stages: StagePolicies,
    pub collaborators: CollaboratorCommands,
    pub text: TextConfig,
    /// Built-in speech synthesis, used when `collaborators.speech` is unset.
    pub speech: SpeechConfig,
    /// Built-in captioned video rendering, used when `collaborators.video` is unset.
    pub video: VideoConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            poll_interval_ms: 1_000,
            grace_delay_ms: 2_000,
            stable_samples: 3,
            stages: StagePolicies::default(),
            collaborators: CollaboratorCommands::default(),
            text: TextConfig::default(),
            speech: SpeechConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

/// Readiness and retry policy for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagePolicy {
    pub readiness: ReadinessPolicy,
    pub timeout_secs: u64,
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl StagePolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagePolicies {
    pub text: StagePolicy,
    pub speech: StagePolicy,
    pub mix: StagePolicy,
    pub video: StagePolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            text: StagePolicy {
                readiness: ReadinessPolicy::Existence,
                timeout_secs: 0,
                max_attempts: 1,
            },
            speech: StagePolicy {
                readiness: ReadinessPolicy::SizeStable,
                timeout_secs: 600,
                max_attempts: 1,
            },
            mix: StagePolicy {
                readiness: ReadinessPolicy::SizeStable,
                timeout_secs: 180,
                max_attempts: 1,
            },
            video: StagePolicy {
                readiness: ReadinessPolicy::Existence,
                timeout_secs: 0,
                max_attempts: 1,
            },
        }
    }
}

impl StagePolicies {
    pub fn for_stage(&self, stage: StageKind) -> StagePolicy {
        match stage {
            StageKind::TextGenerated => self.text,
            StageKind::SpeechSynthesized => self.speech,
            StageKind::AmbienceMixed => self.mix,
            StageKind::VideoRendered => self.video,
        }
    }
}

/// External command used as a stage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Argument template split with shell-words; `{placeholders}` are
    /// substituted per argument.
    pub command: String,
    /// Spawn without waiting for exit; completion is left to the readiness wait.
    #[serde(default)]
    pub detach: bool,
}

impl CommandSpec {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            detach: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollaboratorCommands {
    pub speech: Option<CommandSpec>,
    pub mix: Option<CommandSpec>,
    pub video: Option<CommandSpec>,
}

impl Default for CollaboratorCommands {
    fn default() -> Self {
        Self {
            speech: None,
            mix: Some(CommandSpec::new(DEFAULT_MIX_COMMAND)),
            video: None,
        }
    }
}

/// Where sermon text comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum LmBackendConfig {
    /// OpenAI-compatible chat-completions endpoint.
    Http {
        endpoint: String,
        model: String,
        api_key_env: String,
        #[serde(default = "default_temperature")]
        temperature: f32,
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
        #[serde(default = "default_request_timeout")]
        timeout_secs: u64,
    },
    /// Local command: prompt on stdin, completion on stdout.
    Command { command: String },
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2_000
}

fn default_request_timeout() -> u64 {
    180
}

impl Default for LmBackendConfig {
    fn default() -> Self {
        LmBackendConfig::Http {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextConfig {
    pub backend: LmBackendConfig,
    pub target_words: u32,
    pub min_words: u32,
    pub max_words: u32,
    pub max_continuations: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            backend: LmBackendConfig::default(),
            target_words: 1_000,
            min_words: 950,
            max_words: 1_050,
            max_continuations: 3,
        }
    }
}

/// OpenAI-compatible text-to-speech endpoint. Long texts are sent in chunks
/// and the returned parts are joined into one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    /// Delivery guidance passed with every chunk.
    pub instructions: String,
    pub api_key_env: String,
    /// Upper bound on characters per request.
    pub max_chunk_chars: usize,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/speech".to_string(),
            model: "gpt-4o-mini-tts".to_string(),
            voice: "ash".to_string(),
            speed: 0.75,
            instructions: "Speak in a slow and reverent tone, as if you are reading from a sacred text."
                .to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_chunk_chars: 4_000,
            timeout_secs: 300,
        }
    }
}

/// Transcribes the mixed audio to subtitles with whisper.
pub const DEFAULT_TRANSCRIBE_COMMAND: &str =
    "whisper {input} --model base --output_format srt --output_dir {work_dir}";

/// Loops the background image under the audio and burns in the subtitles.
/// Runs inside the render work dir, where the subtitles are `captions.srt`.
pub const DEFAULT_RENDER_COMMAND: &str = "ffmpeg -y -loglevel error -loop 1 -i {image} -i {input} -vf \"subtitles=captions.srt:force_style='FontName=Arial,FontSize=24,PrimaryColour=&HFFFFFF,OutlineColour=&H000000,OutlineWidth=2,BorderStyle=4,BackColour=&H80000000,Alignment=2'\" -c:v libx264 -tune stillimage -c:a aac -b:a 192k -pix_fmt yuv420p -shortest {output}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Still image behind the captions; relative paths are under the root.
    pub background: PathBuf,
    /// Must leave exactly one `.srt` file in `{work_dir}`.
    pub transcribe_command: String,
    /// Must write `{output}`; `{subtitles}` and `{image}` are absolute paths.
    pub render_command: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            background: PathBuf::from("assets").join("default_background.png"),
            transcribe_command: DEFAULT_TRANSCRIBE_COMMAND.to_string(),
            render_command: DEFAULT_RENDER_COMMAND.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Build the readiness waiter described by this config.
    pub fn waiter(&self) -> FileReadinessWaiter {
        FileReadinessWaiter {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            grace_delay: Duration::from_millis(self.grace_delay_ms),
            stable_samples: self.stable_samples,
        }
    }

    /// Text backend after applying the `SERMONS_LM_COMMAND` override.
    pub fn resolved_lm_backend(&self) -> LmBackendConfig {
        match env::var(LM_COMMAND_ENV) {
            Ok(command) if !command.trim().is_empty() => LmBackendConfig::Command { command },
            _ => self.text.backend.clone(),
        }
    }
}

/// Render a pretty JSON config stub for `sermons init`.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&PipelineConfig::default()).context("serialize config stub")
}

/// Load a config file.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serialize config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Find the config to use: explicit path, root `sermons.json`, then the user
/// config directory. `None` means built-in defaults.
pub fn resolve_config_path(layout: &PipelineLayout, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = layout.config_path();
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("sermons").join("config.json"))
        .filter(|path| path.is_file())
}

/// Resolve, load and validate the config for a run.
pub fn load_for_root(
    layout: &PipelineLayout,
    explicit: Option<&Path>,
) -> Result<(PipelineConfig, Option<PathBuf>)> {
    let path = resolve_config_path(layout, explicit);
    let config = match path.as_deref() {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    validate_config(&config)?;
    Ok((config, path))
}

/// Validate schema version, timing and collaborator commands.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    if config.poll_interval_ms == 0 {
        return Err(anyhow!("poll_interval_ms must be greater than zero"));
    }
    if config.stable_samples == 0 {
        return Err(anyhow!("stable_samples must be greater than zero"));
    }
    if config.stages.text.readiness != ReadinessPolicy::Existence {
        return Err(anyhow!(
            "stages.text.readiness must be \"existence\" (text generation is synchronous)"
        ));
    }
    for stage in StageKind::ALL {
        let policy = config.stages.for_stage(stage);
        if policy.max_attempts == 0 {
            return Err(anyhow!("stages.{stage}.max_attempts must be at least 1"));
        }
        if policy.readiness != ReadinessPolicy::Existence && policy.timeout_secs == 0 {
            return Err(anyhow!(
                "stages.{stage}.timeout_secs must be greater than zero for a polling policy"
            ));
        }
    }
    let commands = [
        ("speech", config.collaborators.speech.as_ref()),
        ("mix", config.collaborators.mix.as_ref()),
        ("video", config.collaborators.video.as_ref()),
    ];
    for (name, spec) in commands {
        if let Some(spec) = spec {
            validate_command(&spec.command)
                .with_context(|| format!("collaborators.{name}.command"))?;
        }
    }
    if config.collaborators.speech.is_none() {
        let speech = &config.speech;
        if speech.endpoint.trim().is_empty() || speech.model.trim().is_empty() {
            return Err(anyhow!("speech endpoint and model must be non-empty"));
        }
        if speech.max_chunk_chars == 0 {
            return Err(anyhow!("speech.max_chunk_chars must be greater than zero"));
        }
        if !(0.25..=4.0).contains(&speech.speed) {
            return Err(anyhow!(
                "speech.speed must be between 0.25 and 4.0 (got {})",
                speech.speed
            ));
        }
    }
    if config.collaborators.video.is_none() {
        validate_command(&config.video.transcribe_command).context("video.transcribe_command")?;
        validate_command(&config.video.render_command).context("video.render_command")?;
    }
    let text = &config.text;
    if text.min_words > text.max_words {
        return Err(anyhow!(
            "text.min_words ({}) must not exceed text.max_words ({})",
            text.min_words,
            text.max_words
        ));
    }
    match &text.backend {
        LmBackendConfig::Http {
            endpoint, model, ..
        } => {
            if endpoint.trim().is_empty() || model.trim().is_empty() {
                return Err(anyhow!("text.backend endpoint and model must be non-empty"));
            }
        }
        LmBackendConfig::Command { command } => {
            validate_command(command).context("text.backend.command")?;
        }
    }
    Ok(())
}

fn validate_command(command: &str) -> Result<()> {
    let argv = shell_words::split(command).with_context(|| format!("parse command: {command}"))?;
    if argv.is_empty() {
        return Err(anyhow!("command is empty"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
