//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Writes its input's word count as the "audio".
pub const SPEECH_COMMAND: &str = r#"sh -c 'wc -w < "$1" > "$2"' sh {input} {output}"#;
/// Concatenates speech and ambience.
pub const MIX_COMMAND: &str = r#"sh -c 'cat "$1" "$2" > "$3"' sh {input} {ambience} {output}"#;
/// Copies the mix as the "video".
pub const VIDEO_COMMAND: &str = r#"sh -c 'cp "$1" "$2"' sh {input} {output}"#;
/// Ignores the prompt and answers with 1000 words.
pub const LM_COMMAND: &str = r#"sh -c 'cat >/dev/null; i=0; while [ $i -lt 1000 ]; do printf "peace "; i=$((i+1)); done'"#;

/// A temporary pipeline root driven through the `sermons` binary.
pub struct PipelineRoot {
    temp: TempDir,
}

impl PipelineRoot {
    /// Empty root with a fast config and working stand-in collaborators.
    pub fn new() -> Self {
        let root = Self {
            temp: TempDir::new().expect("create temp root"),
        };
        root.write_config(&fast_config(SPEECH_COMMAND));
        root
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(&path, contents.as_bytes()).expect("write file");
    }

    pub fn write_config(&self, config: &Value) {
        let text = serde_json::to_string_pretty(config).expect("serialize config");
        self.write("sermons.json", &text);
    }

    pub fn add_ambience(&self) {
        self.write("processed_audio/trimmed_ambience.mp3", "rain on a tin roof\n");
    }

    pub fn add_text(&self, identity: &str) {
        self.write(
            &format!("data/{identity}.txt"),
            "Dear friends in Christ, thank you for joining me today.",
        );
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.join(rel).is_file()
    }

    /// Run the binary against this root.
    pub fn sermons(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_sermons"))
            .arg("--root")
            .arg(self.path())
            .args(args)
            .env_remove("SERMONS_LM_COMMAND")
            .env("RUST_LOG", "info")
            .output()
            .expect("spawn sermons")
    }

    /// Run and parse stdout as JSON, asserting success.
    pub fn sermons_json(&self, args: &[&str]) -> Value {
        let output = self.sermons(args);
        assert!(
            output.status.success(),
            "sermons {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }
}

/// Config with millisecond polling so waits finish quickly.
pub fn fast_config(speech_command: &str) -> Value {
    json!({
        "schema_version": 1,
        "poll_interval_ms": 10,
        "grace_delay_ms": 0,
        "stable_samples": 3,
        "stages": {
            "speech": { "readiness": "size_stable", "timeout_secs": 5 },
            "mix": { "readiness": "size_stable", "timeout_secs": 5 }
        },
        "collaborators": {
            "speech": { "command": speech_command },
            "mix": { "command": MIX_COMMAND },
            "video": { "command": VIDEO_COMMAND }
        },
        "text": {
            "backend": { "kind": "command", "command": LM_COMMAND }
        }
    })
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
