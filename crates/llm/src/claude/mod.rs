//! Analysis service provider backed by the Claude CLI
//!
//! Each analysis attempt runs one `claude -p` process with the analysis JSON
//! schema. Hooks, plugins and tools are disabled so that a git hook which
//! itself triggers Claude cannot recurse.
//!
//! The child is killed when the attempt is dropped, so a per-attempt timeout
//! in the client never leaves a process behind.

use std::{
  path::{Path, PathBuf},
  process::Stdio,
  time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{io::AsyncWriteExt, process::Command, time::timeout};
use tracing::{debug, error, trace, warn};

use crate::{InferenceRequest, InferenceResponse, LlmError, LlmProvider, Result};

/// Bytes of stderr kept for error classification and logs.
const STDERR_TAIL: usize = 2048;

/// Claude CLI provider for analysis requests
#[derive(Debug, Clone)]
pub struct ClaudeProvider {
  claude_path: Option<PathBuf>,
}

impl ClaudeProvider {
  /// Look up `claude` on PATH. Use `is_available()` to check the result.
  pub fn new() -> Self {
    Self {
      claude_path: find_on_path("claude"),
    }
  }

  pub fn with_path(path: impl Into<PathBuf>) -> Self {
    Self {
      claude_path: Some(path.into()),
    }
  }

  fn command(&self, path: &Path, request: &InferenceRequest) -> Command {
    let mut cmd = Command::new(path);
    cmd
      .arg("-p")
      .arg("--model")
      .arg(&request.model)
      .arg("--output-format")
      .arg("json")
      .arg("--no-session-persistence")
      .arg("--settings")
      .arg(r#"{"hooks":{}}"#)
      .arg("--setting-sources")
      .arg("")
      .arg("--tools")
      .arg("");

    if let Some(system) = &request.system_prompt {
      cmd.arg("--append-system-prompt").arg(system);
    }
    if !request.json_schema.is_empty() {
      cmd.arg("--json-schema").arg(&request.json_schema);
    }

    cmd
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    cmd
  }
}

impl Default for ClaudeProvider {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
  fn name(&self) -> &str {
    "claude-cli"
  }

  fn is_available(&self) -> bool {
    self.claude_path.is_some()
  }

  async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse> {
    let Some(path) = &self.claude_path else {
      return Err(LlmError::ClaudeNotFound);
    };

    let start = Instant::now();
    debug!(
      model = %request.model,
      prompt_len = request.prompt.len(),
      timeout_secs = request.timeout_secs,
      structured = !request.json_schema.is_empty(),
      "Running analysis through Claude CLI"
    );

    let mut child = self.command(path, &request).spawn().map_err(|e| {
      error!(err = %e, path = %path.display(), "Failed to spawn Claude CLI");
      LlmError::SpawnFailed(e)
    })?;

    // Feed the prompt while stdout and stderr are drained, so neither side
    // can block on a full pipe
    let stdin = child.stdin.take();
    let prompt = request.prompt.as_bytes();
    let write = async move {
      if let Some(mut stdin) = stdin {
        stdin.write_all(prompt).await?;
      }
      Ok::<_, std::io::Error>(())
    };
    let run = async { tokio::join!(write, child.wait_with_output()) };

    let (written, output) = match timeout(Duration::from_secs(request.timeout_secs.max(1)), run).await {
      Ok(done) => done,
      Err(_) => {
        warn!(
          timeout_secs = request.timeout_secs,
          elapsed_ms = start.elapsed().as_millis() as u64,
          "Claude CLI timed out, killing process"
        );
        return Err(LlmError::Timeout(request.timeout_secs));
      }
    };

    let output = output?;
    let stderr = stderr_tail(&output.stderr);
    if let Err(e) = written {
      // A child that exits without reading its input closes the pipe early
      debug!(err = %e, "Claude CLI did not read the whole prompt");
    }

    if !output.status.success() {
      let code = output.status.code().unwrap_or(-1);
      error!(exit_code = code, stderr = %stderr, "Claude CLI process failed");
      return Err(classify_exit(code, stderr));
    }
    if !stderr.is_empty() {
      trace!(stderr = %stderr, "Claude CLI stderr");
    }

    let response = read_envelope(&String::from_utf8_lossy(&output.stdout))?;
    debug!(
      response_len = response.text.len(),
      input_tokens = response.input_tokens,
      output_tokens = response.output_tokens,
      cost_usd = ?response.cost_usd,
      elapsed_ms = start.elapsed().as_millis() as u64,
      "Claude CLI analysis completed"
    );
    Ok(response)
  }
}

// ============================================================================
// Output envelope
// ============================================================================

/// `--output-format json` prints either the full message list or only the
/// final result message, depending on the CLI version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
  Messages(Vec<ClaudeMessage>),
  Single(ClaudeMessage),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeMessage {
  Assistant { message: MessageContent },
  Result(ResultMessage),
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
  #[serde(default)]
  content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
  Text {
    text: String,
  },
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct ResultMessage {
  #[serde(default)]
  is_error: bool,
  #[serde(default)]
  duration_ms: u64,
  total_cost_usd: Option<f64>,
  usage: Option<Usage>,
  result: Option<String>,
  /// Present when `--json-schema` was given
  structured_output: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
  #[serde(default)]
  input_tokens: u32,
  #[serde(default)]
  output_tokens: u32,
}

/// Pull the analysis text out of the CLI output.
///
/// Schema output wins over assistant text, which wins over the result text.
/// Output that is not a recognizable envelope is passed through as-is for
/// the response parser to grade.
fn read_envelope(stdout: &str) -> Result<InferenceResponse> {
  let stdout = stdout.trim();
  if stdout.is_empty() {
    return Err(LlmError::NoResponse);
  }

  let messages = match serde_json::from_str::<Envelope>(stdout) {
    Ok(Envelope::Messages(messages)) => messages,
    Ok(Envelope::Single(message)) => vec![message],
    Err(e) => {
      warn!(
        err = %e,
        output_preview = %stdout.chars().take(200).collect::<String>(),
        "Unrecognized Claude CLI output, passing it through as text"
      );
      return Ok(raw_response(stdout));
    }
  };

  let mut assistant_text = String::new();
  let mut result = None;
  for message in messages {
    match message {
      ClaudeMessage::Assistant { message } => {
        for block in message.content {
          if let ContentBlock::Text { text } = block {
            assistant_text.push_str(&text);
          }
        }
      }
      ClaudeMessage::Result(message) => result = Some(message),
      ClaudeMessage::Other => {}
    }
  }

  let Some(result) = result else {
    if assistant_text.is_empty() {
      return Err(LlmError::NoResponse);
    }
    return Ok(raw_response(&assistant_text));
  };

  if result.is_error {
    let message = result.result.unwrap_or_else(|| "unknown error".to_string());
    error!(err = %message, "Claude CLI reported an error");
    return Err(classify_error(message));
  }

  let text = match result.structured_output {
    Some(structured) => structured.to_string(),
    None if !assistant_text.is_empty() => assistant_text,
    None => result.result.unwrap_or_default(),
  };
  if text.is_empty() {
    return Err(LlmError::NoResponse);
  }

  let usage = result.usage.unwrap_or_default();
  Ok(InferenceResponse {
    text,
    input_tokens: usage.input_tokens,
    output_tokens: usage.output_tokens,
    cost_usd: result.total_cost_usd,
    duration_ms: result.duration_ms,
  })
}

fn raw_response(text: &str) -> InferenceResponse {
  InferenceResponse {
    text: text.to_string(),
    input_tokens: 0,
    output_tokens: 0,
    cost_usd: None,
    duration_ms: 0,
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Map an error reported by the CLI onto the variants the client's retry
/// policy understands.
fn classify_error(msg: String) -> LlmError {
  let lower = msg.to_lowercase();
  if lower.contains("401") || lower.contains("api key") || lower.contains("authentication") || lower.contains("/login")
  {
    LlmError::Authentication(msg)
  } else if lower.contains("429") || lower.contains("rate limit") {
    LlmError::RateLimited(msg)
  } else if lower.contains("400") || lower.contains("invalid_request") {
    LlmError::InvalidRequest(msg)
  } else {
    LlmError::ClaudeError(msg)
  }
}

/// A failed exit is classified by its stderr when that names a known cause.
fn classify_exit(code: i32, stderr: String) -> LlmError {
  if stderr.is_empty() {
    return LlmError::ProcessFailed(code);
  }
  match classify_error(stderr) {
    LlmError::ClaudeError(_) => LlmError::ProcessFailed(code),
    known => known,
  }
}

fn stderr_tail(stderr: &[u8]) -> String {
  let text = String::from_utf8_lossy(stderr);
  let text = text.trim();
  let mut start = text.len().saturating_sub(STDERR_TAIL);
  while !text.is_char_boundary(start) {
    start += 1;
  }
  text[start..].to_string()
}

fn find_on_path(name: &str) -> Option<PathBuf> {
  let paths = std::env::var_os("PATH")?;
  let found = std::env::split_paths(&paths)
    .map(|dir| dir.join(name))
    .find(|candidate| candidate.is_file());
  match &found {
    Some(path) => trace!(path = %path.display(), "Found claude executable"),
    None => debug!("Claude executable not found on PATH"),
  }
  found
}
