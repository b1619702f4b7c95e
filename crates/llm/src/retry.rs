// Retry policy for analysis service calls
//
// Exponential backoff with jitter over a bounded number of retries. Only
// transient failures are retried; see `LlmError::is_transient`.

use std::time::Duration;

use hookwise_core::RetrySettings;
use rand::Rng;

/// Backoff is spread uniformly over `base * (1 ± JITTER_RATIO)`.
const JITTER_RATIO: f64 = 0.25;

/// Configuration for retrying analysis service calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Maximum number of retry attempts after the initial one
  pub max_retries: u32,
  /// Initial backoff duration
  pub initial_backoff: Duration,
  /// Maximum backoff duration
  pub max_backoff: Duration,
  /// Backoff multiplier (exponential factor)
  pub backoff_multiplier: f64,
  /// Whether to add jitter to backoff
  pub add_jitter: bool,
  /// Timeout for a single attempt
  pub request_timeout: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(30),
      backoff_multiplier: 2.0,
      add_jitter: true,
      request_timeout: Duration::from_secs(120),
    }
  }
}

impl RetryConfig {
  pub fn from_settings(settings: &RetrySettings, request_timeout: Duration) -> Self {
    Self {
      max_retries: settings.max_retries,
      initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
      max_backoff: Duration::from_millis(settings.max_backoff_ms),
      backoff_multiplier: settings.backoff_multiplier,
      add_jitter: settings.jitter,
      request_timeout,
    }
  }

  /// Total attempts including the initial one
  pub fn max_attempts(&self) -> u32 {
    self.max_retries + 1
  }

  /// Calculate backoff duration for a given retry (0-based)
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      let factor = rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * factor);
    }

    backoff.min(self.max_backoff)
  }
}
