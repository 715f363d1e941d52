//! Typed paths into a pipeline root.
//!
//! Every stage artifact name is derived from one naming table keyed by
//! `StageKind`, so the probe and the coordinator cannot disagree about where
//! an artifact lives.
use crate::identity::ItemIdentity;
use crate::stage::StageKind;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed ambience asset, relative to the root.
pub const AMBIENCE_REL: &str = "processed_audio/trimmed_ambience.mp3";

/// Directory, suffix and extension used for one stage's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactNaming {
    pub dir: &'static str,
    pub suffix: &'static str,
    pub extension: &'static str,
}

/// Naming rule for a stage.
///
/// The video name keeps the `_with_ambience` suffix because it is derived
/// from the mixed-audio file rather than from the bare identity.
pub const fn naming(stage: StageKind) -> ArtifactNaming {
    match stage {
        StageKind::TextGenerated => ArtifactNaming {
            dir: "data",
            suffix: "",
            extension: "txt",
        },
        StageKind::SpeechSynthesized => ArtifactNaming {
            dir: "audio",
            suffix: "",
            extension: "mp3",
        },
        StageKind::AmbienceMixed => ArtifactNaming {
            dir: "processed_audio",
            suffix: "_with_ambience",
            extension: "mp3",
        },
        StageKind::VideoRendered => ArtifactNaming {
            dir: "videos",
            suffix: "_with_ambience",
            extension: "mp4",
        },
    }
}

impl ArtifactNaming {
    /// File name of the artifact for `identity`.
    pub fn file_name(&self, identity: &ItemIdentity) -> String {
        format!("{}{}.{}", identity.as_str(), self.suffix, self.extension)
    }

    /// Recover the identity from an artifact file name, if it follows this rule.
    pub fn identity_of(&self, file_name: &str) -> Option<ItemIdentity> {
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        let stem = if self.suffix.is_empty() {
            stem
        } else {
            stem.strip_suffix(self.suffix)?
        };
        ItemIdentity::from_stem(stem)
    }
}

/// Convenience wrapper for locating pipeline artifacts.
#[derive(Debug, Clone)]
pub struct PipelineLayout {
    root: PathBuf,
}

impl PipelineLayout {
    /// Create a layout rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the pipeline root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the directory holding a stage's artifacts.
    pub fn stage_dir(&self, stage: StageKind) -> PathBuf {
        self.root.join(naming(stage).dir)
    }

    /// Return the `data/` directory path.
    pub fn text_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::TextGenerated)
    }

    /// Return the `audio/` directory path.
    pub fn audio_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::SpeechSynthesized)
    }

    /// Return the `processed_audio/` directory path.
    pub fn mix_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::AmbienceMixed)
    }

    /// Return the `videos/` directory path.
    pub fn video_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::VideoRendered)
    }

    /// Return the `processed_audio/trimmed_ambience.mp3` path.
    pub fn ambience_path(&self) -> PathBuf {
        self.root.join(AMBIENCE_REL)
    }

    /// Return the `sermons.json` config path inside the root.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("sermons.json")
    }

    /// Return the expected artifact path for `identity` at `stage`.
    pub fn artifact_path(&self, stage: StageKind, identity: &ItemIdentity) -> PathBuf {
        self.stage_dir(stage).join(naming(stage).file_name(identity))
    }

    /// Recover the identity from a path in a stage directory.
    pub fn identity_from_artifact(&self, stage: StageKind, path: &Path) -> Option<ItemIdentity> {
        let file_name = path.file_name()?.to_str()?;
        naming(stage).identity_of(file_name)
    }

    /// Create all stage directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for stage in StageKind::ALL {
            let dir = self.stage_dir(stage);
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }
}
