//! Text Generator (C5).
//!
//! `Ask` is the only caller of this crate; C5 is used only by the
//! retrieval engine. The reference backend invokes the `claude` CLI in print
//! mode with JSON output, the same process-invocation shape a locally running
//! completion service would have, so no network credential or hosted-model
//! dependency is required to exercise the full pipeline.

pub mod generator;
pub mod prompts;

pub use generator::ClaudeCliGenerator;
pub use prompts::build_answer_prompt;

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum LlmError {
  #[error("claude executable not found; ensure 'claude' is in PATH")]
  ClaudeNotFound,

  #[error("failed to spawn claude process: {0}")]
  SpawnFailed(#[from] std::io::Error),

  #[error("claude process timed out after {0} seconds")]
  Timeout(u64),

  #[error("claude process exited with non-zero status: {0}")]
  ProcessFailed(i32),

  #[error("failed to parse JSON response: {0}")]
  ParseError(#[from] serde_json::Error),

  #[error("no assistant message in response")]
  NoResponse,

  #[error("claude returned an error: {0}")]
  ClaudeError(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

impl From<LlmError> for km_core::Error {
  fn from(err: LlmError) -> Self {
    match &err {
      LlmError::ClaudeNotFound | LlmError::SpawnFailed(_) | LlmError::Timeout(_) | LlmError::ProcessFailed(_) => km_core::Error::transient(err.to_string()),
      LlmError::ParseError(_) | LlmError::NoResponse | LlmError::ClaudeError(_) => km_core::Error::fatal(err.to_string()),
    }
  }
}

/// Model selection for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Model {
  #[default]
  Haiku,
  Sonnet,
  Opus,
}

impl Model {
  pub fn as_str(&self) -> &'static str {
    match self {
      Model::Haiku => "haiku",
      Model::Sonnet => "sonnet",
      Model::Opus => "opus",
    }
  }
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
  pub prompt: String,
  pub system_prompt: Option<String>,
  pub model: Model,
  /// Per-call timeout in seconds.
  pub timeout_secs: u64,
}

impl InferenceRequest {
  pub fn new(prompt: impl Into<String>) -> Self {
    Self { prompt: prompt.into(), system_prompt: None, model: Model::default(), timeout_secs: 120 }
  }

  pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
    self.system_prompt = Some(system.into());
    self
  }

  pub fn with_model(mut self, model: Model) -> Self {
    self.model = model;
    self
  }

  pub fn with_timeout(mut self, secs: u64) -> Self {
    self.timeout_secs = secs;
    self
  }
}

#[derive(Debug, Clone)]
pub struct InferenceResponse {
  pub text: String,
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub cost_usd: Option<f64>,
  pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ClaudeMessage {
  System {},
  Assistant(AssistantMessage),
  Result(ResultMessage),
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
  message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
  content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ContentBlock {
  Text { text: String },
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct ResultMessage {
  #[serde(default)]
  is_error: bool,
  #[serde(default)]
  duration_ms: u64,
  #[serde(default)]
  total_cost_usd: f64,
  usage: Option<Usage>,
  result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
  input_tokens: u32,
  output_tokens: u32,
}

fn find_claude() -> Result<String> {
  let which_cmd = if cfg!(windows) { "where" } else { "which" };

  let output = std::process::Command::new(which_cmd).arg("claude").output().map_err(|_| LlmError::ClaudeNotFound)?;

  if !output.status.success() {
    return Err(LlmError::ClaudeNotFound);
  }

  let path = String::from_utf8_lossy(&output.stdout).lines().next().map(|s| s.trim().to_string()).ok_or(LlmError::ClaudeNotFound)?;

  if path.is_empty() {
    return Err(LlmError::ClaudeNotFound);
  }

  Ok(path)
}

/// Spawn `claude -p` in print mode, pipe the prompt over stdin, and parse the
/// JSON transcript it writes to stdout. Hooks and plugins are disabled so a
/// generator invoked from inside this service never recurses into itself.
pub async fn infer(request: InferenceRequest) -> Result<InferenceResponse> {
  let claude_path = find_claude()?;

  let full_prompt = if let Some(system) = &request.system_prompt {
    format!("{}\n\n{}", system, request.prompt)
  } else {
    request.prompt.clone()
  };

  tracing::debug!(model = request.model.as_str(), prompt_len = full_prompt.len(), "starting text generation");

  let mut cmd = Command::new(&claude_path);
  cmd
    .arg("-p")
    .arg("--model")
    .arg(request.model.as_str())
    .arg("--output-format")
    .arg("json")
    .arg("--no-session-persistence")
    .arg("--settings")
    .arg(r#"{"hooks":{}}"#)
    .arg("--setting-sources")
    .arg("")
    .arg("--tools")
    .arg("")
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  let mut child = cmd.spawn()?;

  if let Some(mut stdin) = child.stdin.take() {
    use tokio::io::AsyncWriteExt;
    stdin.write_all(full_prompt.as_bytes()).await?;
    drop(stdin);
  }

  let stdout = child.stdout.take().ok_or_else(|| std::io::Error::other("stdout not piped"))?;
  let mut reader = tokio::io::BufReader::new(stdout);

  let read_future = async {
    let mut output = String::new();
    reader.read_to_string(&mut output).await?;
    Ok::<_, std::io::Error>(output)
  };

  let output = timeout(Duration::from_secs(request.timeout_secs), read_future).await.map_err(|_| LlmError::Timeout(request.timeout_secs))??;

  let status = child.wait().await?;
  if !status.success() {
    return Err(LlmError::ProcessFailed(status.code().unwrap_or(-1)));
  }

  let messages: Vec<ClaudeMessage> = serde_json::from_str(&output)?;

  let mut response_text = String::new();
  let mut input_tokens = 0u32;
  let mut output_tokens = 0u32;
  let mut cost_usd = None;
  let mut duration_ms = 0u64;

  for msg in messages {
    match msg {
      ClaudeMessage::System {} => {}
      ClaudeMessage::Assistant(assistant) => {
        for block in assistant.message.content {
          if let ContentBlock::Text { text } = block {
            response_text.push_str(&text);
          }
        }
      }
      ClaudeMessage::Result(result) => {
        if result.is_error {
          return Err(LlmError::ClaudeError(result.result.unwrap_or_else(|| "unknown error".to_string())));
        }
        duration_ms = result.duration_ms;
        cost_usd = Some(result.total_cost_usd);
        if let Some(usage) = result.usage {
          input_tokens = usage.input_tokens;
          output_tokens = usage.output_tokens;
        }
      }
    }
  }

  if response_text.is_empty() {
    return Err(LlmError::NoResponse);
  }

  tracing::debug!(response_len = response_text.len(), input_tokens, output_tokens, duration_ms, "text generation completed");

  Ok(InferenceResponse { text: response_text, input_tokens, output_tokens, cost_usd, duration_ms })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn model_as_str() {
    assert_eq!(Model::Haiku.as_str(), "haiku");
    assert_eq!(Model::Opus.as_str(), "opus");
  }

  #[test]
  fn inference_request_builder() {
    let req = InferenceRequest::new("q").with_model(Model::Sonnet).with_timeout(30);
    assert_eq!(req.model, Model::Sonnet);
    assert_eq!(req.timeout_secs, 30);
  }

  // Integration test - requires `claude` CLI to be available.
  #[tokio::test]
  #[ignore = "requires claude CLI"]
  async fn test_infer_real() {
    let request = InferenceRequest::new("Say 'hello' and nothing else").with_model(Model::Haiku).with_timeout(30);
    let response = infer(request).await.unwrap();
    assert!(response.text.to_lowercase().contains("hello"));
  }
}
