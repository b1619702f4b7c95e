//! Configuration system for hookwise with per-project overrides.
//!
//! Config priority: project-relative (.hookwise.toml) > user (~/.config/hookwise/config.toml) > defaults

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::AnalysisType;
use crate::error::Result;

/// A setting that failed validation. Fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid config value for `{field}`: {reason}")]
pub struct ConfigValidationError {
  pub field: &'static str,
  pub reason: String,
}

impl ConfigValidationError {
  fn new(field: &'static str, reason: impl Into<String>) -> Self {
    Self {
      field,
      reason: reason.into(),
    }
  }
}

// ============================================================================
// Hooks Configuration
// ============================================================================

/// Hook execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
  /// Run registered handlers at all (default: true)
  pub enabled: bool,

  /// Timeout applied to a handler without its own override (default: 30000)
  pub default_timeout_ms: u64,

  /// Per-handler timeout overrides in milliseconds, keyed by handler name
  pub timeouts: HashMap<String, u64>,

  /// Handlers allowed to run at once across all hook executions (default: 16)
  pub max_concurrent_handlers: usize,
}

impl Default for HooksConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      default_timeout_ms: 30_000,
      timeouts: HashMap::new(),
      max_concurrent_handlers: 16,
    }
  }
}

impl HooksConfig {
  pub fn default_timeout(&self) -> Duration {
    Duration::from_millis(self.default_timeout_ms)
  }

  /// Configured timeout for a handler name, if any
  pub fn timeout_for(&self, handler: &str) -> Option<Duration> {
    self.timeouts.get(handler).map(|ms| Duration::from_millis(*ms))
  }
}

// ============================================================================
// Analysis Configuration
// ============================================================================

/// Code analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  /// Minimum overall score (0-10) for the analysis hook to pass (default: 6.0)
  pub quality_threshold: f64,

  /// Report auto-fixable findings in hook metadata (default: false)
  pub auto_fix: bool,

  /// Analysis types the built-in hook requests (default: quality, security)
  pub types: Vec<AnalysisType>,

  /// Issues below this confidence are dropped (default: 0.5)
  pub confidence_threshold: f64,

  /// Ask the service for fix suggestions (default: true)
  pub include_fix_suggestions: bool,

  /// Per-type analysis tasks allowed in flight across all requests (default: 8)
  pub max_concurrent_analyses: usize,

  /// Model passed to the analysis service (default: "sonnet")
  pub model: String,

  /// Timeout for a single analysis service call in seconds (default: 120)
  pub request_timeout_secs: u64,

  /// Files larger than this are truncated before being sent (default: 100000)
  pub max_file_bytes: usize,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      quality_threshold: 6.0,
      auto_fix: false,
      types: vec![AnalysisType::Quality, AnalysisType::Security],
      confidence_threshold: 0.5,
      include_fix_suggestions: true,
      max_concurrent_analyses: 8,
      model: "sonnet".to_string(),
      request_timeout_secs: 120,
      max_file_bytes: 100_000,
    }
  }
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Two-tier cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// TTL for cached analysis results in seconds (default: 3600)
  pub default_ttl_secs: u64,

  /// Maximum number of entries in the in-process tier (default: 1000)
  pub local_max_entries: u64,

  /// Maximum serialized bytes held by the in-process tier (default: 64 MiB)
  pub local_max_bytes: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_secs: 3600,
      local_max_entries: 1000,
      local_max_bytes: 64 * 1024 * 1024,
    }
  }
}

impl CacheConfig {
  pub fn default_ttl(&self) -> Duration {
    Duration::from_secs(self.default_ttl_secs)
  }
}

// ============================================================================
// Rate Limit / Retry Configuration
// ============================================================================

/// Budgets for the analysis service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
  /// Requests allowed per window (default: 50)
  pub max_requests: usize,

  /// Estimated tokens allowed per window (default: 400000)
  pub max_cost: u64,

  /// Sliding window length in seconds (default: 60)
  pub window_secs: u64,

  /// Longest a caller waits for budget before the attempt fails (default: 120)
  pub max_wait_secs: u64,
}

impl Default for RateLimitSettings {
  fn default() -> Self {
    Self {
      max_requests: 50,
      max_cost: 400_000,
      window_secs: 60,
      max_wait_secs: 120,
    }
  }
}

/// Retry policy for transient analysis service failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  /// Retries after the initial attempt (default: 3)
  pub max_retries: u32,

  /// Backoff before the first retry in milliseconds (default: 1000)
  pub initial_backoff_ms: u64,

  /// Backoff cap in milliseconds (default: 30000)
  pub max_backoff_ms: u64,

  /// Exponential factor (default: 2.0)
  pub backoff_multiplier: f64,

  /// Add up to 25% random jitter (default: true)
  pub jitter: bool,
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff_ms: 1000,
      max_backoff_ms: 30_000,
      backoff_multiplier: 2.0,
      jitter: true,
    }
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  pub log_level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  pub log_rotation: String,

  /// Write logs to a file in the data directory instead of stderr (default: false)
  pub log_to_file: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_rotation: "daily".to_string(),
      log_to_file: false,
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// hookwise configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Hook execution settings
  pub hooks: HooksConfig,

  /// Analysis settings
  pub analysis: AnalysisConfig,

  /// Cache settings
  pub cache: CacheConfig,

  /// Analysis service budgets
  pub rate_limit: RateLimitSettings,

  /// Analysis service retry policy
  pub retry: RetrySettings,

  /// Logging settings
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config for a project and validate it.
  ///
  /// A config file that exists but does not parse is an error rather than a
  /// silent fallback to defaults.
  pub fn load_for_project(project_path: &Path) -> Result<Self> {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists() {
      return Self::load_file(&project_config);
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
    {
      return Self::load_file(&user_config_path);
    }

    Ok(Self::default())
  }

  pub fn load_file(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  pub fn from_toml_str(content: &str) -> Result<Self> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HOOKWISE_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("hookwise").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("hookwise").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".hookwise.toml")
  }

  /// Check every setting the engine relies on.
  pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
    if self.hooks.default_timeout_ms == 0 {
      return Err(ConfigValidationError::new("hooks.default_timeout_ms", "must be greater than zero"));
    }
    if let Some((name, _)) = self.hooks.timeouts.iter().find(|(_, ms)| **ms == 0) {
      return Err(ConfigValidationError::new(
        "hooks.timeouts",
        format!("timeout for handler '{}' must be greater than zero", name),
      ));
    }
    if self.hooks.max_concurrent_handlers == 0 {
      return Err(ConfigValidationError::new("hooks.max_concurrent_handlers", "must be at least 1"));
    }

    let analysis = &self.analysis;
    if !(0.0..=crate::analysis::MAX_SCORE).contains(&analysis.quality_threshold) {
      return Err(ConfigValidationError::new(
        "analysis.quality_threshold",
        format!("must be within 0..=10, got {}", analysis.quality_threshold),
      ));
    }
    if !(0.0..=1.0).contains(&analysis.confidence_threshold) {
      return Err(ConfigValidationError::new(
        "analysis.confidence_threshold",
        format!("must be within 0..=1, got {}", analysis.confidence_threshold),
      ));
    }
    if analysis.types.is_empty() {
      return Err(ConfigValidationError::new("analysis.types", "at least one analysis type is required"));
    }
    if analysis.max_concurrent_analyses == 0 {
      return Err(ConfigValidationError::new("analysis.max_concurrent_analyses", "must be at least 1"));
    }
    if analysis.request_timeout_secs == 0 {
      return Err(ConfigValidationError::new("analysis.request_timeout_secs", "must be greater than zero"));
    }

    if self.cache.default_ttl_secs == 0 {
      return Err(ConfigValidationError::new("cache.default_ttl_secs", "must be greater than zero"));
    }
    if self.cache.local_max_entries == 0 || self.cache.local_max_bytes == 0 {
      return Err(ConfigValidationError::new("cache", "local tier bounds must be greater than zero"));
    }

    if self.rate_limit.max_requests == 0 || self.rate_limit.max_cost == 0 {
      return Err(ConfigValidationError::new("rate_limit", "budgets must be greater than zero"));
    }
    if self.rate_limit.window_secs == 0 {
      return Err(ConfigValidationError::new("rate_limit.window_secs", "must be greater than zero"));
    }

    if self.retry.backoff_multiplier < 1.0 {
      return Err(ConfigValidationError::new(
        "retry.backoff_multiplier",
        format!("must be at least 1.0, got {}", self.retry.backoff_multiplier),
      ));
    }
    if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
      return Err(ConfigValidationError::new(
        "retry.initial_backoff_ms",
        "must not exceed retry.max_backoff_ms",
      ));
    }

    Ok(())
  }
}
