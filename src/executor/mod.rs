//! Adapter between the coordinator and the external stage collaborators.
//!
//! Each stage has one collaborator behind a trait. The executor runs exactly
//! one collaborator call and reports whether it started; it never retries and
//! never waits for the artifact. Confirmation belongs to the readiness waiter.
mod command;
mod lm;
mod speech;
mod text;
mod video;

pub use command::CommandCollaborator;
pub use lm::{LmBackend, LmMessage};
pub use speech::{split_chunks, ChunkedSpeechSynthesizer, HttpSpeechClient, SpeechClient};
pub use text::{LmTextGenerator, Topic, TOPICS};
pub use video::{CaptionedVideoRenderer, SUBTITLES_FILE};

use crate::identity::ItemIdentity;
use crate::layout::PipelineLayout;
use crate::stage::StageKind;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Everything a downstream collaborator may need to produce one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    pub stage: StageKind,
    pub identity: ItemIdentity,
    /// Artifact of the previous stage.
    pub input: PathBuf,
    /// Artifact this stage is expected to produce.
    pub output: PathBuf,
    pub text_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub mix_dir: PathBuf,
    pub video_dir: PathBuf,
    pub ambience: PathBuf,
}

impl StageRequest {
    /// Build the request for a downstream stage; `None` for the text stage,
    /// which has no input artifact.
    pub fn new(layout: &PipelineLayout, stage: StageKind, identity: &ItemIdentity) -> Option<Self> {
        let previous = stage.previous()?;
        Some(Self {
            stage,
            identity: identity.clone(),
            input: layout.artifact_path(previous, identity),
            output: layout.artifact_path(stage, identity),
            text_dir: layout.text_dir(),
            audio_dir: layout.audio_dir(),
            mix_dir: layout.mix_dir(),
            video_dir: layout.video_dir(),
            ambience: layout.ambience_path(),
        })
    }
}

/// Produces a brand-new text artifact and returns its path.
pub trait TextGenerator {
    fn generate(&self, text_dir: &Path) -> Result<PathBuf>;
}

/// Writes `request.output` from the text artifact, possibly asynchronously.
pub trait SpeechSynthesizer {
    fn synthesize(&self, request: &StageRequest) -> Result<()>;
}

/// Lays the speech over the ambience bed into `request.output`.
pub trait AmbienceMixer {
    fn mix(&self, request: &StageRequest) -> Result<()>;
}

/// Renders the mixed audio into a video at `request.output`.
pub trait VideoRenderer {
    fn render(&self, request: &StageRequest) -> Result<()>;
}

/// What a single collaborator call reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Action started or returned; the artifact still has to be confirmed.
    Started,
    /// Text stage produced this file.
    Generated(PathBuf),
    /// Action failed to start or returned an error.
    Failed(String),
}

/// Stand-in for a stage with no configured collaborator.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured;

impl Unconfigured {
    fn fail(request: &StageRequest) -> Result<()> {
        Err(anyhow::anyhow!(
            "no {} collaborator configured (set collaborators.{} in sermons.json)",
            request.stage,
            request.stage
        ))
    }
}

impl SpeechSynthesizer for Unconfigured {
    fn synthesize(&self, request: &StageRequest) -> Result<()> {
        Unconfigured::fail(request)
    }
}

impl AmbienceMixer for Unconfigured {
    fn mix(&self, request: &StageRequest) -> Result<()> {
        Unconfigured::fail(request)
    }
}

impl VideoRenderer for Unconfigured {
    fn render(&self, request: &StageRequest) -> Result<()> {
        Unconfigured::fail(request)
    }
}

/// One boxed collaborator per stage.
pub struct StageExecutor {
    text: Box<dyn TextGenerator>,
    speech: Box<dyn SpeechSynthesizer>,
    mix: Box<dyn AmbienceMixer>,
    video: Box<dyn VideoRenderer>,
}

impl StageExecutor {
    pub fn new(
        text: Box<dyn TextGenerator>,
        speech: Box<dyn SpeechSynthesizer>,
        mix: Box<dyn AmbienceMixer>,
        video: Box<dyn VideoRenderer>,
    ) -> Self {
        Self {
            text,
            speech,
            mix,
            video,
        }
    }

    /// Run the text collaborator.
    pub fn generate_text(&self, layout: &PipelineLayout) -> ExecOutcome {
        match self.text.generate(&layout.text_dir()) {
            Ok(path) => ExecOutcome::Generated(path),
            Err(err) => ExecOutcome::Failed(format!("{err:#}")),
        }
    }

    /// Run the collaborator for a downstream stage.
    pub fn execute(&self, request: &StageRequest) -> ExecOutcome {
        tracing::debug!(
            stage = %request.stage,
            item = %request.identity,
            output = %request.output.display(),
            "stage action start"
        );
        let result = match request.stage {
            StageKind::TextGenerated => Err(anyhow::anyhow!(
                "text stage is run through generate_text"
            )),
            StageKind::SpeechSynthesized => self.speech.synthesize(request),
            StageKind::AmbienceMixed => self.mix.mix(request),
            StageKind::VideoRendered => self.video.render(request),
        };
        match result {
            Ok(()) => ExecOutcome::Started,
            Err(err) => ExecOutcome::Failed(format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FixedText(PathBuf);

    impl TextGenerator for FixedText {
        fn generate(&self, _text_dir: &Path) -> Result<PathBuf> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<StageRequest>>,
    }

    impl SpeechSynthesizer for Recorder {
        fn synthesize(&self, request: &StageRequest) -> Result<()> {
            self.seen.borrow_mut().push(request.clone());
            Ok(())
        }
    }

    fn id(stem: &str) -> ItemIdentity {
        ItemIdentity::from_stem(stem).expect("valid identity")
    }

    #[test]
    fn request_wires_previous_artifact_as_input() {
        let temp = TempDir::new().expect("temp dir");
        let layout = PipelineLayout::new(temp.path().to_path_buf());
        let item = id("20240101_000000_faith");

        assert!(StageRequest::new(&layout, StageKind::TextGenerated, &item).is_none());

        let video = StageRequest::new(&layout, StageKind::VideoRendered, &item).expect("request");
        assert_eq!(
            video.input,
            layout.mix_dir().join("20240101_000000_faith_with_ambience.mp3")
        );
        assert_eq!(
            video.output,
            layout.video_dir().join("20240101_000000_faith_with_ambience.mp4")
        );
        assert_eq!(video.ambience, layout.ambience_path());
    }

    #[test]
    fn executor_dispatches_by_stage_and_reports_failures() {
        let temp = TempDir::new().expect("temp dir");
        let layout = PipelineLayout::new(temp.path().to_path_buf());
        let text_path = layout.text_dir().join("x.txt");
        let executor = StageExecutor::new(
            Box::new(FixedText(text_path.clone())),
            Box::<Recorder>::default(),
            Box::new(Unconfigured),
            Box::new(Unconfigured),
        );
        let item = id("20240101_000000_faith");

        assert_eq!(
            executor.generate_text(&layout),
            ExecOutcome::Generated(text_path)
        );

        let speech =
            StageRequest::new(&layout, StageKind::SpeechSynthesized, &item).expect("request");
        assert_eq!(executor.execute(&speech), ExecOutcome::Started);

        let mix = StageRequest::new(&layout, StageKind::AmbienceMixed, &item).expect("request");
        let ExecOutcome::Failed(cause) = executor.execute(&mix) else {
            panic!("unconfigured mixer must fail");
        };
        assert!(cause.contains("no mix collaborator configured"));
    }
}
