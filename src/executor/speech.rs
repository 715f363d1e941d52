//! Built-in speech stage: text-to-speech over HTTP.
//!
//! The sermon is split on whitespace into chunks the endpoint accepts. Each
//! chunk comes back as an mp3 part; parts are appended to a hidden temp file
//! in the audio dir, which is renamed onto the artifact once every part has
//! arrived. A failed item therefore never leaves a partial mp3 behind.
use super::{SpeechSynthesizer, StageRequest};
use crate::config::SpeechConfig;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;
use std::fs;
use std::io::Write;
use std::time::{Duration, Instant};

/// Largest audio part accepted from the endpoint.
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Turns one chunk of text into encoded audio.
pub trait SpeechClient {
    fn speak(&self, text: &str) -> Result<Vec<u8>>;
}

/// OpenAI-compatible `audio/speech` endpoint.
pub struct HttpSpeechClient {
    agent: ureq::Agent,
    config: SpeechConfig,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f32,
    instructions: &'a str,
    response_format: &'static str,
}

impl HttpSpeechClient {
    pub fn new(config: SpeechConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            config,
        }
    }
}

impl SpeechClient for HttpSpeechClient {
    fn speak(&self, text: &str) -> Result<Vec<u8>> {
        let config = &self.config;
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            anyhow!(
                "{} is not set; the speech stage needs an API key",
                config.api_key_env
            )
        })?;
        let body = SpeechRequest {
            model: &config.model,
            voice: &config.voice,
            input: text,
            speed: config.speed,
            instructions: &config.instructions,
            response_format: "mp3",
        };
        let mut response = self
            .agent
            .post(config.endpoint.as_str())
            .header("Authorization", format!("Bearer {api_key}"))
            .send_json(&body)
            .with_context(|| format!("POST {}", config.endpoint))?;
        let audio = response
            .body_mut()
            .with_config()
            .limit(MAX_PART_BYTES)
            .read_to_vec()
            .context("read speech response")?;
        if audio.is_empty() {
            return Err(anyhow!("speech endpoint returned no audio"));
        }
        Ok(audio)
    }
}

/// Speech collaborator that chunks the text and joins the returned parts.
pub struct ChunkedSpeechSynthesizer<C> {
    client: C,
    max_chunk_chars: usize,
}

impl<C: SpeechClient> ChunkedSpeechSynthesizer<C> {
    pub fn new(client: C, max_chunk_chars: usize) -> Self {
        Self {
            client,
            max_chunk_chars,
        }
    }
}

impl ChunkedSpeechSynthesizer<HttpSpeechClient> {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self::new(HttpSpeechClient::new(config.clone()), config.max_chunk_chars)
    }
}

impl<C: SpeechClient> SpeechSynthesizer for ChunkedSpeechSynthesizer<C> {
    fn synthesize(&self, request: &StageRequest) -> Result<()> {
        let text = fs::read_to_string(&request.input)
            .with_context(|| format!("read {}", request.input.display()))?;
        let chunks = split_chunks(&text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(anyhow!("{} has no text to speak", request.input.display()));
        }

        let audio_dir = request
            .output
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent dir", request.output.display()))?;
        fs::create_dir_all(audio_dir)
            .with_context(|| format!("create {}", audio_dir.display()))?;
        let mut joined = tempfile::Builder::new()
            .prefix(".speech-")
            .suffix(".part")
            .tempfile_in(audio_dir)
            .with_context(|| format!("create temp file in {}", audio_dir.display()))?;

        let start = Instant::now();
        for (index, chunk) in chunks.iter().enumerate() {
            tracing::debug!(
                item = %request.identity,
                part = index + 1,
                parts = chunks.len(),
                chars = chunk.chars().count(),
                "speaking chunk"
            );
            let audio = self
                .client
                .speak(chunk)
                .with_context(|| format!("speech part {} of {}", index + 1, chunks.len()))?;
            joined
                .write_all(&audio)
                .context("append speech part")?;
        }
        joined.flush().context("flush speech parts")?;
        joined
            .persist(&request.output)
            .map_err(|err| err.error)
            .with_context(|| format!("move speech into {}", request.output.display()))?;
        tracing::info!(
            item = %request.identity,
            parts = chunks.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "speech synthesized"
        );
        Ok(())
    }
}

/// Split text into chunks of at most `max_chars` characters, breaking on
/// whitespace. A single word longer than the limit is cut mid-word.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        let separator = usize::from(!current.is_empty());
        if current_chars + separator + word.len() > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_chars += 1;
        }
        current_chars += word.len();
        current.extend(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
