use crate::cli::GlobalArgs;
use crate::config::{self, PipelineConfig};
use crate::executor::{
    AmbienceMixer, CaptionedVideoRenderer, ChunkedSpeechSynthesizer, CommandCollaborator,
    LmBackend, LmTextGenerator, SpeechSynthesizer, StageExecutor, Unconfigured, VideoRenderer,
};
use crate::layout::PipelineLayout;
use anyhow::Result;
use std::path::PathBuf;

/// Layout and validated config for one command invocation.
pub(crate) struct PipelineContext {
    pub(crate) layout: PipelineLayout,
    pub(crate) config: PipelineConfig,
    pub(crate) config_path: Option<PathBuf>,
}

impl PipelineContext {
    pub(crate) fn load(global: &GlobalArgs) -> Result<Self> {
        let layout = PipelineLayout::new(global.root.clone());
        let (config, config_path) = config::load_for_root(&layout, global.config.as_deref())?;
        match config_path.as_deref() {
            Some(path) => tracing::debug!(config = %path.display(), "config loaded"),
            None => tracing::debug!("no config file found; using defaults"),
        }
        Ok(Self {
            layout,
            config,
            config_path,
        })
    }

    /// Wire the configured collaborators into an executor. The LM backend and
    /// the speech client, and with them their HTTP agents, are built here once
    /// per run. Speech and video fall back to the built-in collaborators when
    /// no command is configured.
    pub(crate) fn executor(&self) -> StageExecutor {
        let backend = LmBackend::from_config(&self.config.resolved_lm_backend());
        let text = LmTextGenerator::new(backend, self.config.text.clone());
        let commands = &self.config.collaborators;

        let speech: Box<dyn SpeechSynthesizer> = match &commands.speech {
            Some(spec) => Box::new(CommandCollaborator::new(spec.clone())),
            None => Box::new(ChunkedSpeechSynthesizer::from_config(&self.config.speech)),
        };
        let mix: Box<dyn AmbienceMixer> = match &commands.mix {
            Some(spec) => Box::new(CommandCollaborator::new(spec.clone())),
            None => Box::new(Unconfigured),
        };
        let video: Box<dyn VideoRenderer> = match &commands.video {
            Some(spec) => Box::new(CommandCollaborator::new(spec.clone())),
            None => Box::new(CaptionedVideoRenderer::new(
                &self.config.video,
                self.layout.root(),
            )),
        };
        StageExecutor::new(Box::new(text), speech, mix, video)
    }
}
