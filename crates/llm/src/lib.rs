mod client;
mod parse;
mod prompts;
mod provider;
mod rate_limit;
mod retry;

#[cfg(feature = "claude")]
mod claude;

#[cfg(feature = "claude")]
pub use claude::ClaudeProvider;
pub use client::{AnalysisClient, ServiceClient};
pub use parse::{HeuristicFindings, ParsedResponse, StructuredFindings, parse_response};
pub use prompts::{ANALYSIS_SCHEMA, ANALYSIS_SYSTEM_PROMPT, build_analysis_prompt, format_files};
pub use provider::{LlmProvider, Result};
pub use rate_limit::{BudgetError, BudgetToken, RateLimitConfig, RateLimiter, SlidingWindowLimiter};
pub use retry::RetryConfig;

use hookwise_core::ErrorCategory;

/// Create the default LLM provider based on available features
///
/// Returns the first available provider in priority order:
/// 1. Claude CLI (if `claude` feature is enabled)
///
/// Returns an error if no provider is available.
pub fn create_provider() -> Result<Box<dyn LlmProvider>> {
  #[cfg(feature = "claude")]
  {
    let provider = claude::ClaudeProvider::new();
    if provider.is_available() {
      return Ok(Box::new(provider));
    }
    Err(LlmError::ClaudeNotFound)
  }

  #[cfg(not(feature = "claude"))]
  {
    Err(LlmError::NoProviderAvailable)
  }
}

/// Request for LLM inference
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
  /// The prompt to send
  pub prompt: String,
  /// Optional system prompt
  pub system_prompt: Option<String>,
  /// Model to use
  pub model: String,
  /// Timeout in seconds (default: 60)
  pub timeout_secs: u64,
  /// Optional JSON schema for structured output
  pub json_schema: String,
}

impl InferenceRequest {
  pub fn new(prompt: impl Into<String>, json_schema: String) -> Self {
    Self {
      prompt: prompt.into(),
      system_prompt: None,
      model: Default::default(),
      timeout_secs: 60,
      json_schema,
    }
  }

  /// Rough token estimate used against the cost budget (4 chars per token,
  /// plus headroom for the response).
  pub fn estimated_cost(&self) -> u64 {
    const RESPONSE_ALLOWANCE: u64 = 1024;
    let chars = self.prompt.len() + self.system_prompt.as_ref().map_or(0, |s| s.len());
    (chars as u64).div_ceil(4) + RESPONSE_ALLOWANCE
  }
}

/// Response from LLM inference
#[derive(Debug, Clone)]
pub struct InferenceResponse {
  /// The text response
  pub text: String,
  /// Input tokens used
  pub input_tokens: u32,
  /// Output tokens generated
  pub output_tokens: u32,
  /// Cost in USD (if available)
  pub cost_usd: Option<f64>,
  /// Duration in milliseconds
  pub duration_ms: u64,
}

/// Errors that can occur during LLM inference
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("Failed to spawn process: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("process timed out after {0} seconds")]
  Timeout(u64),
  #[error("process exited with non-zero status: {0}")]
  ProcessFailed(i32),
  #[error("No assistant message in response")]
  NoResponse,
  #[error("Network error: {0}")]
  Network(String),
  #[error("Rate limited by provider: {0}")]
  RateLimited(String),
  #[error("Authentication failed: {0}")]
  Authentication(String),
  #[error("Invalid request: {0}")]
  InvalidRequest(String),
  #[error("No LLM provider available. Enable a provider feature (e.g., 'claude').")]
  NoProviderAvailable,
  #[cfg(feature = "claude")]
  #[error("Claude executable not found. Ensure 'claude' is in your PATH.")]
  ClaudeNotFound,
  #[cfg(feature = "claude")]
  #[error("Claude returned an error: {0}")]
  ClaudeError(String),
}

impl LlmError {
  /// Whether retrying the same request may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Timeout(_) | Self::ProcessFailed(_) | Self::NoResponse | Self::Network(_) | Self::RateLimited(_) => true,
      // A missing binary or a bad schema will not fix itself
      Self::SpawnFailed(e) => matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
      ),
      Self::Authentication(_) | Self::InvalidRequest(_) | Self::NoProviderAvailable => false,
      #[cfg(feature = "claude")]
      Self::ClaudeNotFound => false,
      #[cfg(feature = "claude")]
      Self::ClaudeError(msg) => is_transient_message(msg),
    }
  }

  /// Whether the failure happened before the provider could count the request
  /// against its own limits.
  pub fn never_reached_provider(&self) -> bool {
    matches!(self, Self::SpawnFailed(_) | Self::Network(_))
  }
}

/// Classify a provider error message by the status codes and phrases it carries.
pub(crate) fn is_transient_message(msg: &str) -> bool {
  let lower = msg.to_lowercase();
  lower.contains("429")
    || lower.contains("502")
    || lower.contains("503")
    || lower.contains("504")
    || lower.contains("529")
    || lower.contains("rate limit")
    || lower.contains("overloaded")
    || lower.contains("timed out")
    || lower.contains("connection")
}

/// Failure of one analysis call after the client's retry policy ran.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
  /// Retryable failure that persisted through every attempt
  #[error("analysis service unavailable after {attempts} attempt(s): {message}")]
  Transient { attempts: u32, message: String },
  /// Non-retryable failure, surfaced on the first attempt
  #[error("analysis service rejected the request: {0}")]
  Fatal(String),
}

impl AnalysisError {
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Transient { .. })
  }

  pub fn category(&self) -> ErrorCategory {
    match self {
      Self::Transient { .. } => ErrorCategory::Transient,
      Self::Fatal(_) => ErrorCategory::Fatal,
    }
  }
}
