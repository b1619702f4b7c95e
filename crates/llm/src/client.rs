//! Client for the external analysis service
//!
//! Wraps an [`LlmProvider`] with the shared rate-limit budget, a per-attempt
//! timeout, bounded retries for transient failures and tiered response
//! parsing. One call analyzes one analysis type.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hookwise_core::{AnalysisType, Config, FileInput, TypeResult};
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::{
  ANALYSIS_SCHEMA, ANALYSIS_SYSTEM_PROMPT, AnalysisError, InferenceRequest, LlmProvider, format_files, parse_response,
  rate_limit::{BudgetError, RateLimitConfig, RateLimiter},
  retry::RetryConfig,
};

/// Seam between the orchestrator and the analysis service.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
  /// Run one analysis type over `files`. The formatted files are appended to
  /// `prompt` before sending; request options are already part of `prompt`.
  async fn analyze(
    &self,
    prompt: &str,
    files: &[FileInput],
    analysis_type: AnalysisType,
  ) -> Result<TypeResult, AnalysisError>;
}

pub struct ServiceClient {
  provider: Box<dyn LlmProvider>,
  limiter: Arc<RateLimiter>,
  retry: RetryConfig,
  model: String,
  max_file_bytes: usize,
}

impl ServiceClient {
  pub fn new(provider: Box<dyn LlmProvider>, config: &Config) -> Self {
    Self {
      provider,
      limiter: Arc::new(RateLimiter::new(RateLimitConfig::from(&config.rate_limit))),
      retry: RetryConfig::from_settings(
        &config.retry,
        Duration::from_secs(config.analysis.request_timeout_secs),
      ),
      model: config.analysis.model.clone(),
      max_file_bytes: config.analysis.max_file_bytes,
    }
  }

  /// Share a budget with other clients talking to the same service.
  pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
    self.limiter = limiter;
    self
  }

  pub fn with_retry(mut self, retry: RetryConfig) -> Self {
    self.retry = retry;
    self
  }

  pub fn provider_name(&self) -> &str {
    self.provider.name()
  }

  fn build_request(&self, prompt: &str, files: &[FileInput]) -> InferenceRequest {
    let mut full_prompt = String::with_capacity(prompt.len());
    full_prompt.push_str(prompt);
    full_prompt.push_str(&format_files(files, self.max_file_bytes));

    InferenceRequest {
      prompt: full_prompt,
      system_prompt: Some(ANALYSIS_SYSTEM_PROMPT.to_string()),
      model: self.model.clone(),
      timeout_secs: self.retry.request_timeout.as_secs().max(1),
      json_schema: ANALYSIS_SCHEMA.to_string(),
    }
  }
}

#[async_trait]
impl AnalysisClient for ServiceClient {
  async fn analyze(
    &self,
    prompt: &str,
    files: &[FileInput],
    analysis_type: AnalysisType,
  ) -> Result<TypeResult, AnalysisError> {
    let start = Instant::now();
    let request = self.build_request(prompt, files);
    let cost = request.estimated_cost();
    let max_attempts = self.retry.max_attempts();
    let mut last_error = String::new();

    for attempt in 0..max_attempts {
      if attempt > 0 {
        let backoff = self.retry.backoff_for_attempt(attempt - 1);
        debug!(
          analysis_type = %analysis_type,
          attempt,
          backoff_ms = backoff.as_millis() as u64,
          "Retrying analysis request after backoff"
        );
        tokio::time::sleep(backoff).await;
      }

      let token = match self.limiter.acquire(cost).await {
        Ok(token) => token,
        Err(e @ BudgetError::TooLarge { .. }) => {
          warn!(analysis_type = %analysis_type, err = %e, "Analysis request exceeds rate limit budget");
          return Err(AnalysisError::Fatal(e.to_string()));
        }
        Err(e @ BudgetError::Exceeded { .. }) => {
          debug!(analysis_type = %analysis_type, attempt, err = %e, "Rate limit budget not available");
          last_error = e.to_string();
          continue;
        }
      };

      match timeout(self.retry.request_timeout, self.provider.infer(request.clone())).await {
        Ok(Ok(response)) => {
          let mut result = parse_response(&response.text).into_type_result(analysis_type);
          result.duration_ms = start.elapsed().as_millis() as u64;
          debug!(
            analysis_type = %analysis_type,
            provider = self.provider.name(),
            attempt,
            score = result.score,
            provenance = ?result.provenance,
            issues = result.issues.len(),
            duration_ms = result.duration_ms,
            "Analysis completed"
          );
          return Ok(result);
        }
        Ok(Err(e)) => {
          if e.never_reached_provider() {
            let refunded = self.limiter.refund(token).await;
            debug!(analysis_type = %analysis_type, refunded, "Refunded rate limit slot");
          }

          if !e.is_transient() {
            warn!(analysis_type = %analysis_type, attempt, err = %e, "Analysis request failed permanently");
            return Err(AnalysisError::Fatal(e.to_string()));
          }

          debug!(analysis_type = %analysis_type, attempt, err = %e, "Analysis request failed, will retry");
          last_error = e.to_string();
        }
        Err(_) => {
          debug!(
            analysis_type = %analysis_type,
            attempt,
            timeout_ms = self.retry.request_timeout.as_millis() as u64,
            "Analysis request timed out"
          );
          last_error = format!("request timed out after {:?}", self.retry.request_timeout);
        }
      }
    }

    warn!(
      analysis_type = %analysis_type,
      attempts = max_attempts,
      err = %last_error,
      "Analysis request exhausted retries"
    );
    Err(AnalysisError::Transient {
      attempts: max_attempts,
      message: last_error,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;
  use crate::{InferenceResponse, LlmError, Result};

  #[derive(Debug, Clone)]
  enum Step {
    Respond(&'static str),
    Transient,
    Fatal,
    Network,
    Hang,
  }

  /// Replays `steps` in order; the last step repeats.
  #[derive(Clone)]
  struct ScriptedProvider {
    steps: Vec<Step>,
    calls: Arc<AtomicUsize>,
    last_prompt: Arc<Mutex<String>>,
  }

  impl ScriptedProvider {
    fn new(steps: Vec<Step>) -> Self {
      Self {
        steps,
        calls: Arc::new(AtomicUsize::new(0)),
        last_prompt: Arc::new(Mutex::new(String::new())),
      }
    }
  }

  #[async_trait]
  impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
      "scripted"
    }

    fn is_available(&self) -> bool {
      true
    }

    async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      *self.last_prompt.lock().unwrap() = request.prompt;
      let step = self.steps[n.min(self.steps.len() - 1)].clone();
      match step {
        Step::Respond(text) => Ok(InferenceResponse {
          text: text.to_string(),
          input_tokens: 0,
          output_tokens: 0,
          cost_usd: None,
          duration_ms: 0,
        }),
        Step::Transient => Err(LlmError::RateLimited("429 too many requests".to_string())),
        Step::Fatal => Err(LlmError::Authentication("invalid api key".to_string())),
        Step::Network => Err(LlmError::Network("connection refused".to_string())),
        Step::Hang => {
          tokio::time::sleep(Duration::from_secs(3600)).await;
          Err(LlmError::NoResponse)
        }
      }
    }
  }

  fn client(provider: &ScriptedProvider) -> ServiceClient {
    let mut config = Config::default();
    config.retry.max_retries = 3;
    config.retry.jitter = false;
    config.analysis.request_timeout_secs = 5;
    ServiceClient::new(Box::new(provider.clone()), &config)
  }

  async fn run(client: &ServiceClient) -> std::result::Result<TypeResult, AnalysisError> {
    client
      .analyze(
        "Review this",
        &[FileInput::new("src/lib.rs", "fn unsafe_thing() {}")],
        AnalysisType::Quality,
      )
      .await
  }

  #[tokio::test(start_paused = true)]
  async fn test_structured_success_on_first_attempt() {
    let provider = ScriptedProvider::new(vec![Step::Respond(r#"{"score": 9, "issues": []}"#)]);
    let client = client(&provider);

    let result = run(&client).await.unwrap();
    assert_eq!(result.score, 9.0);
    assert_eq!(result.provenance, hookwise_core::Provenance::Structured);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let prompt = provider.last_prompt.lock().unwrap().clone();
    assert!(prompt.starts_with("Review this"));
    assert!(prompt.contains("### src/lib.rs"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_failures_are_bounded() {
    let provider = ScriptedProvider::new(vec![Step::Transient]);
    let client = client(&provider);

    let err = run(&client).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Transient { attempts: 4, .. }));
    assert!(err.is_transient());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fatal_failure_is_not_retried() {
    let provider = ScriptedProvider::new(vec![Step::Fatal]);
    let client = client(&provider);

    let err = run(&client).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Fatal(_)));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_recovers_after_transient_failure() {
    let provider = ScriptedProvider::new(vec![Step::Transient, Step::Respond(r#"{"score": 7}"#)]);
    let client = client(&provider);

    let result = run(&client).await.unwrap();
    assert_eq!(result.score, 7.0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unparseable_response_degrades() {
    let provider = ScriptedProvider::new(vec![Step::Respond("Sorry, I can't help with that.")]);
    let client = client(&provider);

    let result = run(&client).await.unwrap();
    assert_eq!(result.score, hookwise_core::NEUTRAL_SCORE);
    assert_eq!(result.provenance, hookwise_core::Provenance::Degraded);
  }

  #[tokio::test(start_paused = true)]
  async fn test_hung_attempts_time_out_and_retry() {
    let provider = ScriptedProvider::new(vec![Step::Hang, Step::Respond(r#"{"score": 8}"#)]);
    let client = client(&provider);

    let result = run(&client).await.unwrap();
    assert_eq!(result.score, 8.0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_failure_refunds_budget() {
    let provider = ScriptedProvider::new(vec![Step::Network, Step::Respond(r#"{"score": 6}"#)]);
    // A single slot per minute with no patience: the retry only fits if the
    // failed attempt's slot came back
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
      max_requests: 1,
      max_cost: 1_000_000,
      window: Duration::from_secs(60),
      max_wait: Duration::from_millis(1),
    }));
    let client = client(&provider).with_rate_limiter(limiter);

    let result = run(&client).await.unwrap();
    assert_eq!(result.score, 6.0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_oversized_request_is_fatal_without_calling_provider() {
    let provider = ScriptedProvider::new(vec![Step::Respond(r#"{"score": 9}"#)]);
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(10, 100, Duration::from_secs(60))));
    let client = client(&provider).with_rate_limiter(limiter);

    let err = run(&client).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Fatal(_)));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
  }
}
