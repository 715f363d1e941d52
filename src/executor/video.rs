//! Built-in video stage: captions burned over a still background.
//!
//! Each render gets a hidden work dir inside the video dir. The transcription
//! command writes subtitles there, the render command writes the video there,
//! and the finished video is renamed onto the artifact. The work dir and
//! everything in it is removed when the render returns, success or not.
use super::command::{bind, expand, path_arg, request_bindings, run_checked};
use super::{StageRequest, VideoRenderer};
use crate::config::VideoConfig;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name the subtitles are given inside the work dir.
pub const SUBTITLES_FILE: &str = "captions.srt";

pub struct CaptionedVideoRenderer {
    background: PathBuf,
    transcribe_command: String,
    render_command: String,
}

impl CaptionedVideoRenderer {
    /// Relative background paths are resolved against the pipeline root.
    pub fn new(config: &VideoConfig, root: &Path) -> Self {
        Self {
            background: root.join(&config.background),
            transcribe_command: config.transcribe_command.clone(),
            render_command: config.render_command.clone(),
        }
    }

    pub fn background(&self) -> &Path {
        &self.background
    }
}

impl VideoRenderer for CaptionedVideoRenderer {
    fn render(&self, request: &StageRequest) -> Result<()> {
        if !self.background.is_file() {
            return Err(anyhow!(
                "background image {} not found",
                self.background.display()
            ));
        }
        let video_dir = request
            .output
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent dir", request.output.display()))?;
        fs::create_dir_all(video_dir).with_context(|| format!("create {}", video_dir.display()))?;
        let work = tempfile::Builder::new()
            .prefix(".render-")
            .tempdir_in(video_dir)
            .with_context(|| format!("create work dir in {}", video_dir.display()))?;
        let work_dir = absolute(work.path())?;

        let mut bindings = request_bindings(request);
        bind(&mut bindings, "{input}", path_arg(&absolute(&request.input)?));
        bind(&mut bindings, "{work_dir}", path_arg(&work_dir));

        let argv = expand(&self.transcribe_command, &bindings).context("video.transcribe_command")?;
        run_checked(request, &argv, Some(&work_dir))?;
        let subtitles = work_dir.join(SUBTITLES_FILE);
        let produced = find_subtitles(&work_dir)?;
        fs::rename(&produced, &subtitles)
            .with_context(|| format!("rename {}", produced.display()))?;

        let extension = request
            .output
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        let rendered = work_dir.join(format!("render.{extension}"));
        bind(&mut bindings, "{subtitles}", path_arg(&subtitles));
        bind(&mut bindings, "{image}", path_arg(&absolute(&self.background)?));
        bind(&mut bindings, "{output}", path_arg(&rendered));

        let argv = expand(&self.render_command, &bindings).context("video.render_command")?;
        run_checked(request, &argv, Some(&work_dir))?;
        if !rendered.is_file() {
            return Err(anyhow!("render command exited cleanly but wrote no video"));
        }
        fs::rename(&rendered, &request.output)
            .with_context(|| format!("move video into {}", request.output.display()))?;
        tracing::info!(
            item = %request.identity,
            background = %self.background.display(),
            "captioned video rendered"
        );
        Ok(())
    }
}

/// The single `.srt` file the transcription left in `dir`.
fn find_subtitles(dir: &Path) -> Result<PathBuf> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "srt") {
            found.push(path);
        }
    }
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(anyhow!("transcription produced no subtitles")),
        n => Err(anyhow!("transcription produced {n} subtitle files")),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))
}
