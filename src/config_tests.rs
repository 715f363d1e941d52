use super::*;
use tempfile::TempDir;

#[test]
fn defaults_validate_and_match_stage_timeouts() {
    let config = PipelineConfig::default();
    validate_config(&config).expect("defaults validate");

    let speech = config.stages.for_stage(StageKind::SpeechSynthesized);
    assert_eq!(speech.readiness, ReadinessPolicy::SizeStable);
    assert_eq!(speech.timeout(), Duration::from_secs(600));
    let mix = config.stages.for_stage(StageKind::AmbienceMixed);
    assert_eq!(mix.timeout(), Duration::from_secs(180));
    let video = config.stages.for_stage(StageKind::VideoRendered);
    assert_eq!(video.readiness, ReadinessPolicy::Existence);

    let waiter = config.waiter();
    assert_eq!(waiter.poll_interval, Duration::from_secs(1));
    assert_eq!(waiter.grace_delay, Duration::from_secs(2));
    assert_eq!(waiter.stable_samples, 3);
}

#[test]
fn stub_round_trips_through_disk() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("nested").join("sermons.json");
    let stub = config_stub().expect("stub");
    assert!(stub.contains("\"schema_version\": 1"));

    write_config(&path, &PipelineConfig::default()).expect("write config");
    let loaded = load_config(&path).expect("load config");
    assert_eq!(loaded, PipelineConfig::default());
}

#[test]
fn partial_config_fills_in_defaults() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("sermons.json");
    fs::write(
        &path,
        r#"{
  "schema_version": 1,
  "poll_interval_ms": 50,
  "stages": {
    "speech": { "readiness": "modification", "timeout_secs": 30, "max_attempts": 2 }
  },
  "collaborators": {
    "speech": { "command": "tts --in {input} --out {output}", "detach": true }
  }
}"#,
    )
    .expect("write config");

    let config = load_config(&path).expect("load config");
    validate_config(&config).expect("valid");
    assert_eq!(config.poll_interval_ms, 50);
    assert_eq!(config.grace_delay_ms, 2_000);
    assert_eq!(config.stages.speech.readiness, ReadinessPolicy::Modification);
    assert_eq!(config.stages.speech.max_attempts, 2);
    assert_eq!(config.stages.mix, StagePolicies::default().mix);
    let speech = config.collaborators.speech.expect("speech command");
    assert!(speech.detach);
    assert!(config.collaborators.video.is_none());
    assert_eq!(config.text.min_words, 950);
}

#[test]
fn unknown_fields_are_rejected() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("sermons.json");
    fs::write(&path, r#"{ "schema_version": 1, "poll_ms": 5 }"#).expect("write config");
    let err = load_config(&path).expect_err("unknown field");
    assert!(format!("{err:#}").contains("poll_ms"));
}

#[test]
fn validation_rejects_bad_values() {
    let cases: [(&str, fn(&mut PipelineConfig)); 11] = [
        ("schema_version", |c: &mut PipelineConfig| c.schema_version = 2),
        ("poll_interval_ms", |c: &mut PipelineConfig| c.poll_interval_ms = 0),
        ("stable_samples", |c: &mut PipelineConfig| c.stable_samples = 0),
        (
            "max_attempts",
            |c: &mut PipelineConfig| c.stages.speech.max_attempts = 0,
        ),
        ("timeout_secs", |c: &mut PipelineConfig| c.stages.mix.timeout_secs = 0),
        (
            "stages.text.readiness",
            |c: &mut PipelineConfig| c.stages.text.readiness = ReadinessPolicy::SizeStable,
        ),
        (
            "collaborators.video.command",
            |c: &mut PipelineConfig| c.collaborators.video = Some(CommandSpec::new("   ")),
        ),
        ("min_words", |c: &mut PipelineConfig| c.text.min_words = 2_000),
        (
            "speech.max_chunk_chars",
            |c: &mut PipelineConfig| c.speech.max_chunk_chars = 0,
        ),
        ("speech.speed", |c: &mut PipelineConfig| c.speech.speed = 9.0),
        (
            "video.transcribe_command",
            |c: &mut PipelineConfig| c.video.transcribe_command = "'unclosed".to_string(),
        ),
    ];

    for (needle, mutate) in cases {
        let mut config = PipelineConfig::default();
        mutate(&mut config);
        let err = validate_config(&config).expect_err(needle);
        assert!(
            format!("{err:#}").contains(needle),
            "error for {needle} was: {err:#}"
        );
    }
}

#[test]
fn existence_policy_accepts_zero_timeout() {
    let mut config = PipelineConfig::default();
    config.stages.speech = StagePolicy {
        readiness: ReadinessPolicy::Existence,
        timeout_secs: 0,
        max_attempts: 1,
    };
    validate_config(&config).expect("existence needs no timeout");
}

#[test]
fn explicit_path_wins_and_local_file_is_found() {
    let temp = TempDir::new().expect("temp dir");
    let layout = PipelineLayout::new(temp.path().to_path_buf());
    let explicit = temp.path().join("other.json");

    assert_eq!(
        resolve_config_path(&layout, Some(&explicit)),
        Some(explicit.clone())
    );

    write_config(&layout.config_path(), &PipelineConfig::default()).expect("write local");
    assert_eq!(
        resolve_config_path(&layout, None),
        Some(layout.config_path())
    );

    let (config, path) = load_for_root(&layout, None).expect("load local");
    assert_eq!(path, Some(layout.config_path()));
    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn http_backend_is_tagged_by_kind() {
    let json = r#"{ "kind": "command", "command": "llm -m local" }"#;
    let backend: LmBackendConfig = serde_json::from_str(json).expect("parse backend");
    assert_eq!(
        backend,
        LmBackendConfig::Command {
            command: "llm -m local".to_string()
        }
    );

    let json = r#"{ "kind": "http", "endpoint": "http://localhost:8080/v1/chat/completions", "model": "m", "api_key_env": "KEY" }"#;
    let LmBackendConfig::Http {
        temperature,
        timeout_secs,
        ..
    } = serde_json::from_str::<LmBackendConfig>(json).expect("parse http backend")
    else {
        panic!("expected http backend");
    };
    assert_eq!(timeout_secs, 180);
    assert!((temperature - 0.7).abs() < f32::EPSILON);
}

#[test]
fn builtin_collaborator_settings_are_only_checked_when_in_use() {
    let mut config = PipelineConfig::default();
    config.speech.max_chunk_chars = 0;
    config.video.render_command = String::new();
    assert!(validate_config(&config).is_err());

    config.collaborators.speech = Some(CommandSpec::new("tts {input} {output}"));
    config.collaborators.video = Some(CommandSpec::new("render {input} {output}"));
    validate_config(&config).expect("external commands replace the built-ins");
}

#[test]
fn builtin_speech_and_video_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.speech.voice, "ash");
    assert_eq!(config.speech.max_chunk_chars, 4_000);
    assert!((config.speech.speed - 0.75).abs() < f32::EPSILON);
    assert_eq!(
        config.video.background,
        Path::new("assets").join("default_background.png")
    );
    assert!(config.video.render_command.contains("subtitles=captions.srt"));
    assert!(config.video.transcribe_command.contains("{work_dir}"));
}
