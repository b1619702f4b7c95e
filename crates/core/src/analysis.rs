//! Analysis request/result types shared by the orchestrator and the service client.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Upper bound of the score scale.
pub const MAX_SCORE: f64 = 10.0;

/// Score used when nothing better is known: mid-scale.
///
/// Reported as `overall_score` when every requested type failed, and used for
/// service responses that could not be parsed at all.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Kind of analysis the service is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
  /// General correctness and maintainability
  Quality,
  /// Vulnerabilities, leaked secrets, unsafe patterns
  Security,
  /// Algorithmic and resource-usage problems
  Performance,
  /// Formatting and idiom conformance
  Style,
  /// Missing or stale documentation
  Documentation,
  /// Overly complex control flow
  Complexity,
}

impl AnalysisType {
  pub const ALL: [AnalysisType; 6] = [
    Self::Quality,
    Self::Security,
    Self::Performance,
    Self::Style,
    Self::Documentation,
    Self::Complexity,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Quality => "quality",
      Self::Security => "security",
      Self::Performance => "performance",
      Self::Style => "style",
      Self::Documentation => "documentation",
      Self::Complexity => "complexity",
    }
  }

  /// Whether findings from the analysis service should be corroborated by the
  /// local static checks before being reported.
  pub fn requires_corroboration(&self) -> bool {
    matches!(self, Self::Security)
  }
}

impl std::fmt::Display for AnalysisType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for AnalysisType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "quality" | "code_quality" => Ok(Self::Quality),
      "security" => Ok(Self::Security),
      "performance" | "perf" => Ok(Self::Performance),
      "style" => Ok(Self::Style),
      "documentation" | "docs" => Ok(Self::Documentation),
      "complexity" => Ok(Self::Complexity),
      _ => Err(Error::validation(format!("Unknown analysis type: {}", s))),
    }
  }
}

/// One file submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInput {
  pub path: String,
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub language: Option<String>,
}

impl FileInput {
  pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      content: content.into(),
      language: None,
    }
  }

  pub fn with_language(mut self, language: impl Into<String>) -> Self {
    self.language = Some(language.into());
    self
  }

  /// SHA-256 of the file content, hex encoded.
  pub fn content_hash(&self) -> String {
    hex::encode(Sha256::digest(self.content.as_bytes()))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
  pub include_fix_suggestions: bool,
  /// Issues reported with lower confidence are dropped (0.0 - 1.0)
  pub confidence_threshold: f64,
  /// Skip the cache lookup and overwrite whatever is cached
  pub force_refresh: bool,
  /// Cache TTL override in seconds; the configured default applies when unset
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cache_ttl_secs: Option<u64>,
}

impl Default for AnalysisOptions {
  fn default() -> Self {
    Self {
      include_fix_suggestions: true,
      confidence_threshold: 0.5,
      force_refresh: false,
      cache_ttl_secs: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
  pub files: Vec<FileInput>,
  pub analysis_types: BTreeSet<AnalysisType>,
  #[serde(default)]
  pub context: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  pub options: AnalysisOptions,
}

impl AnalysisRequest {
  pub fn new(files: Vec<FileInput>, analysis_types: impl IntoIterator<Item = AnalysisType>) -> Self {
    Self {
      files,
      analysis_types: analysis_types.into_iter().collect(),
      context: BTreeMap::new(),
      options: AnalysisOptions::default(),
    }
  }

  pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.context.insert(key.into(), value);
    self
  }

  pub fn with_options(mut self, options: AnalysisOptions) -> Self {
    self.options = options;
    self
  }

  /// Reject requests that cannot be dispatched.
  pub fn validate(&self) -> Result<()> {
    if self.files.is_empty() {
      return Err(Error::validation("analysis request has no files"));
    }
    if self.analysis_types.is_empty() {
      return Err(Error::validation("analysis request has no analysis types"));
    }
    if let Some(file) = self.files.iter().find(|f| f.path.trim().is_empty()) {
      return Err(Error::validation(format!(
        "analysis request contains a file with an empty path ({} bytes)",
        file.content.len()
      )));
    }
    let threshold = self.options.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
      return Err(Error::validation(format!(
        "confidence_threshold must be within 0.0..=1.0, got {}",
        threshold
      )));
    }
    if self.options.cache_ttl_secs == Some(0) {
      return Err(Error::validation("cache_ttl_secs must be greater than zero"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Info,
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Info => "info",
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }

  /// Score deduction applied per issue of this severity.
  pub fn penalty(&self) -> f64 {
    match self {
      Self::Info => 0.0,
      Self::Low => 0.5,
      Self::Medium => 1.0,
      Self::High => 2.0,
      Self::Critical => 4.0,
    }
  }
}

impl std::str::FromStr for Severity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "info" | "note" | "hint" => Ok(Self::Info),
      "low" | "minor" => Ok(Self::Low),
      "medium" | "moderate" | "warning" => Ok(Self::Medium),
      "high" | "major" | "error" => Ok(Self::High),
      "critical" | "blocker" => Ok(Self::Critical),
      _ => Err(Error::validation(format!("Unknown severity: {}", s))),
    }
  }
}

fn default_confidence() -> f64 {
  1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
  pub analysis_type: AnalysisType,
  pub severity: Severity,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line: Option<u32>,
  /// Identifier of the rule that produced the issue (static checks only)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rule: Option<String>,
  #[serde(default = "default_confidence")]
  pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
  pub analysis_type: AnalysisType,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
  pub analysis_type: AnalysisType,
  pub file: String,
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub replacement: Option<String>,
}

/// Where a [`TypeResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
  /// Service response parsed as a structured object
  Structured,
  /// Service response parsed from free-form text
  Heuristic,
  /// Service response could not be parsed; neutral placeholder
  Degraded,
  /// Local static checks only
  Static,
  /// Service findings merged with local static checks
  Corroborated,
}

/// Findings for one analysis type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeResult {
  pub analysis_type: AnalysisType,
  pub score: f64,
  #[serde(default)]
  pub issues: Vec<Issue>,
  #[serde(default)]
  pub suggestions: Vec<Suggestion>,
  #[serde(default)]
  pub auto_fixable: Vec<Fix>,
  pub provenance: Provenance,
  #[serde(default)]
  pub duration_ms: u64,
}

impl TypeResult {
  pub fn new(analysis_type: AnalysisType, score: f64, provenance: Provenance) -> Self {
    Self {
      analysis_type,
      score: clamp_score(score),
      issues: Vec::new(),
      suggestions: Vec::new(),
      auto_fixable: Vec::new(),
      provenance,
      duration_ms: 0,
    }
  }

  /// Minimal safe result for a response nothing could be extracted from: the
  /// raw text is surfaced as a single suggestion.
  pub fn degraded(analysis_type: AnalysisType, raw_text: &str) -> Self {
    let mut result = Self::new(analysis_type, NEUTRAL_SCORE, Provenance::Degraded);
    let text = raw_text.trim();
    if !text.is_empty() {
      result.suggestions.push(Suggestion {
        analysis_type,
        message: text.to_string(),
        file: None,
      });
    }
    result
  }

  /// Drop issues below the confidence threshold, and fixes when not requested.
  pub fn apply_options(&mut self, options: &AnalysisOptions) {
    self.issues.retain(|i| i.confidence >= options.confidence_threshold);
    if !options.include_fix_suggestions {
      self.auto_fixable.clear();
    }
  }

  pub fn highest_severity(&self) -> Option<Severity> {
    self.issues.iter().map(|i| i.severity).max()
  }
}

/// Scores outside the scale (or NaN) are pulled back onto it.
pub fn clamp_score(score: f64) -> f64 {
  if score.is_nan() {
    NEUTRAL_SCORE
  } else {
    score.clamp(0.0, MAX_SCORE)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
  /// Retryable failure that persisted through every retry
  Transient,
  /// Non-retryable failure (auth, malformed request)
  Fatal,
  /// The analysis task itself failed (panic, local check failure)
  Internal,
}

/// A requested analysis type that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
  pub analysis_type: AnalysisType,
  pub category: ErrorCategory,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
  pub overall_score: f64,
  pub per_type: Vec<TypeResult>,
  pub issues: Vec<Issue>,
  pub suggestions: Vec<Suggestion>,
  pub auto_fixable: Vec<Fix>,
  pub errors: Vec<ErrorEntry>,
  #[serde(default)]
  pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AnalysisResult {
  pub fn succeeded(&self) -> bool {
    !self.per_type.is_empty()
  }

  /// Every requested type produced a result. Only complete results are
  /// cached, so a failed type is retried on the next call.
  pub fn is_complete(&self) -> bool {
    self.succeeded() && self.errors.is_empty()
  }

  pub fn count_by_severity(&self, severity: Severity) -> usize {
    self.issues.iter().filter(|i| i.severity == severity).count()
  }

  pub fn type_result(&self, analysis_type: AnalysisType) -> Option<&TypeResult> {
    self.per_type.iter().find(|t| t.analysis_type == analysis_type)
  }
}
