//! LM backends used by the text stage.
//!
//! `Http` talks to an OpenAI-compatible chat-completions endpoint through a
//! `ureq::Agent` built once per run. `Command` pipes the rendered prompt to a
//! local command on stdin and reads the completion from stdout.
use crate::config::LmBackendConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LmMessage {
    pub role: &'static str,
    pub content: String,
}

impl LmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

pub enum LmBackend {
    Http {
        agent: ureq::Agent,
        endpoint: String,
        model: String,
        api_key_env: String,
        temperature: f32,
        max_tokens: u32,
    },
    Command {
        command: String,
    },
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [LmMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl LmBackend {
    /// Build the backend for a run. The HTTP agent lives as long as the backend.
    pub fn from_config(config: &LmBackendConfig) -> Self {
        match config {
            LmBackendConfig::Http {
                endpoint,
                model,
                api_key_env,
                temperature,
                max_tokens,
                timeout_secs,
            } => {
                let agent_config = ureq::Agent::config_builder()
                    .timeout_global(Some(Duration::from_secs(*timeout_secs)))
                    .build();
                LmBackend::Http {
                    agent: ureq::Agent::new_with_config(agent_config),
                    endpoint: endpoint.clone(),
                    model: model.clone(),
                    api_key_env: api_key_env.clone(),
                    temperature: *temperature,
                    max_tokens: *max_tokens,
                }
            }
            LmBackendConfig::Command { command } => LmBackend::Command {
                command: command.clone(),
            },
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            LmBackend::Http {
                endpoint, model, ..
            } => format!("{model} via {endpoint}"),
            LmBackend::Command { command } => format!("command `{command}`"),
        }
    }

    /// Send the conversation and return the assistant's reply text.
    pub fn complete(&self, messages: &[LmMessage]) -> Result<String> {
        let start = Instant::now();
        let prompt_bytes: usize = messages.iter().map(|m| m.content.len()).sum();
        let text = match self {
            LmBackend::Http {
                agent,
                endpoint,
                model,
                api_key_env,
                temperature,
                max_tokens,
            } => {
                let api_key = env::var(api_key_env).map_err(|_| {
                    anyhow!("{api_key_env} is not set; the text stage needs an API key")
                })?;
                let body = ChatRequest {
                    model,
                    messages,
                    temperature: *temperature,
                    max_tokens: *max_tokens,
                };
                let mut response = agent
                    .post(endpoint.as_str())
                    .header("Authorization", format!("Bearer {api_key}"))
                    .send_json(&body)
                    .with_context(|| format!("POST {endpoint}"))?;
                let parsed: ChatResponse = response
                    .body_mut()
                    .read_json()
                    .context("decode chat completion response")?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| anyhow!("chat completion returned no content"))?
            }
            LmBackend::Command { command } => {
                invoke_lm_command(command, &render_transcript(messages))?
            }
        };
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes,
            response_bytes = text.len(),
            "lm invoke complete"
        );
        Ok(strip_code_fence(&text).to_string())
    }
}

/// Flatten a conversation into a single stdin prompt.
fn render_transcript(messages: &[LmMessage]) -> String {
    if let [only] = messages {
        return only.content.clone();
    }
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(&format!("## {}\n\n{}\n\n", message.role, message.content.trim()));
    }
    prompt
}

fn invoke_lm_command(command: &str, prompt: &str) -> Result<String> {
    let args =
        shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
    if args.is_empty() {
        return Err(anyhow!("LM command is empty"));
    }

    let mut child = Command::new(&args[0])
        .args(&args[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn LM command: {}", args[0]))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .context("write prompt to LM stdin")?;
    }

    let output = child.wait_with_output().context("wait for LM command")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "LM command failed with status {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")
}

/// Drop a surrounding markdown fence some models wrap prose in.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim()
}
