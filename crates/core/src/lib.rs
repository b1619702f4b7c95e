pub mod analysis;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hook;

pub use analysis::{
  AnalysisOptions, AnalysisRequest, AnalysisResult, AnalysisType, ErrorCategory, ErrorEntry, FileInput, Fix, Issue,
  MAX_SCORE, NEUTRAL_SCORE, Provenance, Severity, Suggestion, TypeResult, clamp_score,
};
pub use config::{
  AnalysisConfig, CacheConfig, Config, ConfigValidationError, HooksConfig, LoggingConfig, RateLimitSettings,
  RetrySettings,
};
pub use error::{Error, Result};
pub use fingerprint::cache_key;
pub use hook::{
  ChangeKind, CommitInfo, FileChange, HandlerId, HandlerOutcome, HookContext, HookErrorKind, HookResult, HookType,
};
