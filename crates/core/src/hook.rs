//! Hook domain types: lifecycle stages, trigger payloads and per-handler results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Git lifecycle stage a handler is bound to.
///
/// Unknown names parse as [`HookType::Custom`] so external triggers can
/// introduce their own stages without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookType {
  PreCommit,
  CommitMsg,
  PostCommit,
  PrePush,
  PostMerge,
  Custom(String),
}

impl HookType {
  pub fn as_str(&self) -> &str {
    match self {
      Self::PreCommit => "pre-commit",
      Self::CommitMsg => "commit-msg",
      Self::PostCommit => "post-commit",
      Self::PrePush => "pre-push",
      Self::PostMerge => "post-merge",
      Self::Custom(name) => name,
    }
  }

  /// Whether a failing result for this stage can block the git operation.
  ///
  /// Post-* hooks run after git has already committed to the operation.
  pub fn is_blocking(&self) -> bool {
    matches!(self, Self::PreCommit | Self::CommitMsg | Self::PrePush)
  }
}

impl std::fmt::Display for HookType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl From<&str> for HookType {
  fn from(s: &str) -> Self {
    match s.trim().to_lowercase().as_str() {
      "pre-commit" | "pre_commit" | "precommit" => Self::PreCommit,
      "commit-msg" | "commit_msg" => Self::CommitMsg,
      "post-commit" | "post_commit" => Self::PostCommit,
      "pre-push" | "pre_push" => Self::PrePush,
      "post-merge" | "post_merge" => Self::PostMerge,
      _ => Self::Custom(s.trim().to_string()),
    }
  }
}

impl From<String> for HookType {
  fn from(s: String) -> Self {
    Self::from(s.as_str())
  }
}

impl From<HookType> for String {
  fn from(hook: HookType) -> Self {
    hook.as_str().to_string()
  }
}

impl std::str::FromStr for HookType {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::from(s))
  }
}

/// Identifier issued by a hook registry.
///
/// Allocated from a per-registry monotonic counter, so two registrations never
/// share an id no matter how quickly they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(pub u64);

impl std::fmt::Display for HandlerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "handler-{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
  Added,
  Modified,
  Deleted,
  Renamed,
}

impl ChangeKind {
  /// Whether the file still has content worth analyzing after the change.
  pub fn has_content(&self) -> bool {
    !matches!(self, Self::Deleted)
  }
}

/// A file touched by the triggering git operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
  pub path: String,
  /// Full post-change content, when the trigger supplies it
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  /// Unified diff for the change, when the trigger supplies it
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diff: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub language: Option<String>,
  pub change_kind: ChangeKind,
}

impl FileChange {
  /// Text to analyze: full content if present, otherwise the diff.
  pub fn analyzable_text(&self) -> Option<&str> {
    self.content.as_deref().or(self.diff.as_deref())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub author: Option<String>,
}

/// Immutable payload handed to every handler of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookContext {
  #[serde(default)]
  pub files: Vec<FileChange>,
  #[serde(default)]
  pub commit: CommitInfo,
  /// Opaque trigger options, passed through untouched
  #[serde(default)]
  pub options: serde_json::Map<String, serde_json::Value>,
  #[serde(default = "Utc::now")]
  pub triggered_at: DateTime<Utc>,
}

impl HookContext {
  pub fn new(files: Vec<FileChange>, commit: CommitInfo) -> Self {
    Self {
      files,
      commit,
      options: serde_json::Map::new(),
      triggered_at: Utc::now(),
    }
  }

  pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.options.insert(key.into(), value);
    self
  }
}

/// Why a handler did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookErrorKind {
  /// The handler exceeded its timeout and was cancelled
  Timeout { after_ms: u64 },
  /// The handler returned an error or panicked
  Execution { message: String },
}

impl std::fmt::Display for HookErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Timeout { after_ms } => write!(f, "handler timed out after {}ms", after_ms),
      Self::Execution { message } => write!(f, "handler failed: {}", message),
    }
  }
}

/// Outcome of one handler for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
  pub handler_id: HandlerId,
  pub handler: String,
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<HookErrorKind>,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
  pub duration_ms: u64,
}

impl HookResult {
  pub fn is_timeout(&self) -> bool {
    matches!(self.error, Some(HookErrorKind::Timeout { .. }))
  }
}

/// What a handler reports back when it runs to completion.
///
/// `success = false` without an error means the handler deliberately rejects
/// the operation (e.g. a quality gate), as opposed to failing to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutcome {
  pub success: bool,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl HandlerOutcome {
  pub fn passed() -> Self {
    Self {
      success: true,
      metadata: serde_json::Map::new(),
    }
  }

  pub fn rejected(reason: impl Into<String>) -> Self {
    let mut metadata = serde_json::Map::new();
    metadata.insert("reason".to_string(), serde_json::Value::String(reason.into()));
    Self {
      success: false,
      metadata,
    }
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hook_type_parsing() {
    assert_eq!("pre-commit".parse::<HookType>().unwrap(), HookType::PreCommit);
    assert_eq!("PRE_PUSH".parse::<HookType>().unwrap(), HookType::PrePush);
    assert_eq!(
      "deploy-check".parse::<HookType>().unwrap(),
      HookType::Custom("deploy-check".to_string())
    );
  }

  #[test]
  fn test_hook_type_serde_as_string() {
    let json = serde_json::to_string(&HookType::CommitMsg).unwrap();
    assert_eq!(json, "\"commit-msg\"");

    let custom: HookType = serde_json::from_str("\"nightly\"").unwrap();
    assert_eq!(custom, HookType::Custom("nightly".to_string()));
  }

  #[test]
  fn test_blocking_stages() {
    assert!(HookType::PreCommit.is_blocking());
    assert!(HookType::PrePush.is_blocking());
    assert!(!HookType::PostCommit.is_blocking());
    assert!(!HookType::Custom("x".to_string()).is_blocking());
  }

  #[test]
  fn test_context_deserializes_with_defaults() {
    let ctx: HookContext = serde_json::from_str(
      r#"{"files":[{"path":"src/lib.rs","diff":"+fn a() {}","change_kind":"modified"}]}"#,
    )
    .unwrap();
    assert_eq!(ctx.files.len(), 1);
    assert_eq!(ctx.files[0].analyzable_text(), Some("+fn a() {}"));
    assert!(ctx.commit.id.is_none());
    assert!(ctx.options.is_empty());
  }

  #[test]
  fn test_rejected_outcome_carries_reason() {
    let outcome = HandlerOutcome::rejected("score too low");
    assert!(!outcome.success);
    assert_eq!(outcome.metadata.get("reason").and_then(|v| v.as_str()), Some("score too low"));
  }
}
