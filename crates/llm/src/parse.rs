//! Tiered parsing of analysis service responses
//!
//! A response is classified exactly once, here, into a [`ParsedResponse`]:
//! 1. `Structured` - a JSON object matching the analysis schema, raw or
//!    wrapped in a markdown code block or surrounding prose
//! 2. `Heuristic` - free-form text with a recognizable score and/or bullet
//!    findings
//! 3. `Unparseable` - neither; the client degrades it to a neutral result
//!
//! Parsing never fails: callers always get a `TypeResult`.

use std::sync::LazyLock;

use hookwise_core::{
  AnalysisType, Fix, Issue, MAX_SCORE, NEUTRAL_SCORE, Provenance, Severity, Suggestion, TypeResult, clamp_score,
};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, trace};

/// Response resolved into one of the three parse tiers.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
  Structured(StructuredFindings),
  Heuristic(HeuristicFindings),
  Unparseable(String),
}

/// Machine-parseable findings, as requested by the analysis schema.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructuredFindings {
  pub score: f64,
  #[serde(default)]
  pub issues: Vec<RawIssue>,
  #[serde(default)]
  pub suggestions: Vec<RawSuggestion>,
  #[serde(default, alias = "autoFixable", alias = "auto_fixes")]
  pub auto_fixable: Vec<RawFix>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawIssue {
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(alias = "description")]
  pub message: String,
  #[serde(default)]
  pub file: Option<String>,
  #[serde(default)]
  pub line: Option<u32>,
  #[serde(default)]
  pub confidence: Option<f64>,
}

/// Suggestions arrive either as plain strings or as objects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawSuggestion {
  Text(String),
  Detailed {
    #[serde(alias = "description")]
    message: String,
    #[serde(default)]
    file: Option<String>,
  },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawFix {
  #[serde(default)]
  pub file: Option<String>,
  #[serde(alias = "message")]
  pub description: String,
  #[serde(default)]
  pub line: Option<u32>,
  #[serde(default)]
  pub replacement: Option<String>,
}

/// Findings recovered from free-form text.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicFindings {
  pub score: Option<f64>,
  pub issues: Vec<(Severity, String)>,
  pub suggestions: Vec<String>,
}

struct HeuristicPatterns {
  score: Regex,
  ratio: Regex,
  bullet: Regex,
  severity: Regex,
}

impl HeuristicPatterns {
  fn compile() -> Result<Self, regex::Error> {
    Ok(Self {
      score: Regex::new(r"(?i)\bscore\b[^0-9\n]{0,20}(\d+(?:\.\d+)?)(?:\s*(?:/|out of)\s*(10|100))?")?,
      ratio: Regex::new(r"\b(\d+(?:\.\d+)?)\s*/\s*10\b")?,
      bullet: Regex::new(r"^\s*(?:[-*\x{2022}]|\d+[.)])\s+(.+)$")?,
      severity: Regex::new(r"(?i)^\W*(critical|high|medium|low|info|major|minor|blocker|warning)\b\W*\s*(.*)$")?,
    })
  }
}

static PATTERNS: LazyLock<Option<HeuristicPatterns>> = LazyLock::new(|| HeuristicPatterns::compile().ok());

/// Classify a raw response into a parse tier.
pub fn parse_response(text: &str) -> ParsedResponse {
  if let Some(findings) = parse_structured(text) {
    debug!(
      score = findings.score,
      issues = findings.issues.len(),
      "Parsed structured analysis response"
    );
    return ParsedResponse::Structured(findings);
  }

  if let Some(findings) = parse_heuristic(text) {
    debug!(
      score = ?findings.score,
      issues = findings.issues.len(),
      suggestions = findings.suggestions.len(),
      "Parsed analysis response heuristically"
    );
    return ParsedResponse::Heuristic(findings);
  }

  debug!(
    text_len = text.len(),
    text_preview = %text.chars().take(200).collect::<String>(),
    "Analysis response unparseable, degrading"
  );
  ParsedResponse::Unparseable(text.to_string())
}

fn parse_structured(text: &str) -> Option<StructuredFindings> {
  let candidates = [extract_code_block(text), Some(text.trim()), extract_braced(text)];
  for candidate in candidates.into_iter().flatten() {
    match serde_json::from_str::<StructuredFindings>(candidate) {
      Ok(findings) if findings.score.is_finite() => return Some(findings),
      Ok(_) => trace!("Structured response carried a non-finite score"),
      Err(e) => trace!(err = %e, candidate_len = candidate.len(), "Structured parse attempt failed"),
    }
  }
  None
}

fn extract_code_block(text: &str) -> Option<&str> {
  let text = text.trim();

  if !text.starts_with("```") {
    return None;
  }

  // Find the end of the first line (after ```)
  let first_newline = text.find('\n')?;
  let after_fence = &text[first_newline + 1..];

  // Find closing fence
  let end = after_fence.rfind("```")?;
  Some(after_fence[..end].trim())
}

/// The outermost `{ ... }` span, for JSON embedded in prose.
fn extract_braced(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (end > start).then(|| &text[start..=end])
}

fn parse_heuristic(text: &str) -> Option<HeuristicFindings> {
  let patterns = PATTERNS.as_ref()?;

  let score = patterns
    .score
    .captures(text)
    .and_then(|caps| {
      let value: f64 = caps.get(1)?.as_str().parse().ok()?;
      let scale: f64 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(MAX_SCORE);
      Some(value * MAX_SCORE / scale)
    })
    .or_else(|| {
      patterns
        .ratio
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
    });

  let mut issues = Vec::new();
  let mut suggestions = Vec::new();
  let mut in_suggestions = false;

  for line in text.lines() {
    let lower = line.to_lowercase();
    if !patterns.bullet.is_match(line) {
      // Headings switch the bucket bullets land in
      if lower.contains("suggestion") || lower.contains("recommend") {
        in_suggestions = true;
      } else if lower.contains("issue") || lower.contains("problem") || lower.contains("finding") {
        in_suggestions = false;
      }
      continue;
    }

    let Some(item) = patterns.bullet.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str().trim()) else {
      continue;
    };

    if let Some(caps) = patterns.severity.captures(item)
      && let Ok(severity) = caps[1].parse::<Severity>()
    {
      let message = caps.get(2).map_or("", |m| m.as_str()).trim();
      issues.push((severity, if message.is_empty() { item } else { message }.to_string()));
    } else if in_suggestions {
      suggestions.push(item.to_string());
    } else {
      issues.push((Severity::Medium, item.to_string()));
    }
  }

  if score.is_none() && issues.is_empty() && suggestions.is_empty() {
    return None;
  }

  Some(HeuristicFindings {
    score,
    issues,
    suggestions,
  })
}

impl ParsedResponse {
  pub fn provenance(&self) -> Provenance {
    match self {
      Self::Structured(_) => Provenance::Structured,
      Self::Heuristic(_) => Provenance::Heuristic,
      Self::Unparseable(_) => Provenance::Degraded,
    }
  }

  /// Resolve into a `TypeResult`. Heuristic issues carry a reduced confidence
  /// since their severity and attribution were guessed.
  pub fn into_type_result(self, analysis_type: AnalysisType) -> TypeResult {
    const HEURISTIC_CONFIDENCE: f64 = 0.6;

    match self {
      Self::Structured(findings) => {
        let mut result = TypeResult::new(analysis_type, findings.score, Provenance::Structured);
        result.issues = findings
          .issues
          .into_iter()
          .map(|raw| Issue {
            analysis_type,
            severity: raw
              .severity
              .as_deref()
              .and_then(|s| s.parse().ok())
              .unwrap_or(Severity::Medium),
            message: raw.message,
            file: raw.file,
            line: raw.line,
            rule: None,
            confidence: raw.confidence.map_or(1.0, |c| c.clamp(0.0, 1.0)),
          })
          .collect();
        result.suggestions = findings
          .suggestions
          .into_iter()
          .map(|raw| match raw {
            RawSuggestion::Text(message) => Suggestion {
              analysis_type,
              message,
              file: None,
            },
            RawSuggestion::Detailed { message, file } => Suggestion {
              analysis_type,
              message,
              file,
            },
          })
          .collect();
        result.auto_fixable = findings
          .auto_fixable
          .into_iter()
          .filter_map(|raw| {
            Some(Fix {
              analysis_type,
              file: raw.file?,
              description: raw.description,
              line: raw.line,
              replacement: raw.replacement,
            })
          })
          .collect();
        result
      }
      Self::Heuristic(findings) => {
        let mut result = TypeResult::new(
          analysis_type,
          findings.score.map_or(NEUTRAL_SCORE, clamp_score),
          Provenance::Heuristic,
        );
        result.issues = findings
          .issues
          .into_iter()
          .map(|(severity, message)| Issue {
            analysis_type,
            severity,
            message,
            file: None,
            line: None,
            rule: None,
            confidence: HEURISTIC_CONFIDENCE,
          })
          .collect();
        result.suggestions = findings
          .suggestions
          .into_iter()
          .map(|message| Suggestion {
            analysis_type,
            message,
            file: None,
          })
          .collect();
        result
      }
      Self::Unparseable(text) => TypeResult::degraded(analysis_type, &text),
    }
  }
}
