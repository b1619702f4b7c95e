//! Local static checks used to corroborate security findings.
//!
//! Line-oriented regex detectors. They are cheap and deterministic, so they
//! run for every security analysis alongside the service call.

use hookwise_core::{AnalysisType, FileInput, Issue, MAX_SCORE, Provenance, Severity, TypeResult};
use regex::Regex;
use tracing::{debug, warn};

/// Confidence attached to static findings; regexes can misfire on test data.
const STATIC_CONFIDENCE: f64 = 0.9;

struct Rule {
  id: &'static str,
  severity: Severity,
  message: &'static str,
  regex: Regex,
}

const RULES: &[(&str, Severity, &str, &str)] = &[
  (
    "private-key",
    Severity::Critical,
    "Private key material committed to source",
    r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----",
  ),
  (
    "aws-access-key",
    Severity::Critical,
    "AWS access key id in source",
    r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
  ),
  (
    "provider-token",
    Severity::Critical,
    "API token for a hosted service in source",
    r"(?:gh[oprsu]|github_pat)_[\dA-Za-z_]{36}|glpat-[\dA-Za-z_=-]{20,22}|[rs]k_live_[\dA-Za-z]{24,247}|AIzaSy[\dA-Za-z_-]{33}",
  ),
  (
    "hardcoded-secret",
    Severity::High,
    "Hardcoded credential assigned to a variable",
    r#"(?i)\b(?:password|passwd|pwd|secret|api[_-]?key|access[_-]?token|auth[_-]?token|client[_-]?secret)\b\s*[:=]\s*["'][^"'\s]{6,}["']"#,
  ),
  (
    "dynamic-eval",
    Severity::High,
    "Dynamic code execution",
    r"\beval\s*\(|\bexec\s*\(|\bnew\s+Function\s*\(",
  ),
  (
    "sql-concatenation",
    Severity::High,
    "SQL statement built from string concatenation or interpolation",
    r#"(?i)["'](?:select\b[^"']*\bfrom|insert\s+into|update\b[^"']*\bset|delete\s+from)\b[^"']*["']\s*(?:\+|%|\.format\()|\bf["'](?:select|insert|update|delete)\b[^"']*\{"#,
  ),
  (
    "tls-verification-disabled",
    Severity::High,
    "TLS certificate verification disabled",
    r#"(?i)\bverify\s*=\s*false\b|danger_accept_invalid_certs\s*\(\s*true|InsecureSkipVerify\s*:\s*true|rejectUnauthorized\s*:\s*false|NODE_TLS_REJECT_UNAUTHORIZED\s*=\s*["']?0"#,
  ),
];

pub struct StaticChecker {
  rules: Vec<Rule>,
}

impl StaticChecker {
  pub fn new() -> Self {
    let rules = RULES
      .iter()
      .filter_map(|&(id, severity, message, pattern)| match Regex::new(pattern) {
        Ok(regex) => Some(Rule {
          id,
          severity,
          message,
          regex,
        }),
        Err(e) => {
          warn!(rule = id, err = %e, "Skipping static check with invalid pattern");
          None
        }
      })
      .collect();
    Self { rules }
  }

  pub fn rule_count(&self) -> usize {
    self.rules.len()
  }

  /// One issue per matching (rule, line).
  pub fn check(&self, files: &[FileInput]) -> Vec<Issue> {
    let mut issues = Vec::new();
    for file in files {
      for (idx, line) in file.content.lines().enumerate() {
        for rule in &self.rules {
          if rule.regex.is_match(line) {
            issues.push(Issue {
              analysis_type: AnalysisType::Security,
              severity: rule.severity,
              message: rule.message.to_string(),
              file: Some(file.path.clone()),
              line: Some(idx as u32 + 1),
              rule: Some(rule.id.to_string()),
              confidence: STATIC_CONFIDENCE,
            });
          }
        }
      }
    }
    debug!(files = files.len(), findings = issues.len(), "Static checks complete");
    issues
  }

  /// Security result from static findings alone: full marks minus the
  /// severity penalty of every finding.
  pub fn security_result(&self, files: &[FileInput]) -> TypeResult {
    let issues = self.check(files);
    let mut result = TypeResult::new(AnalysisType::Security, score_for(&issues), Provenance::Static);
    result.issues = issues;
    result
  }
}

impl Default for StaticChecker {
  fn default() -> Self {
    Self::new()
  }
}

pub fn score_for(issues: &[Issue]) -> f64 {
  MAX_SCORE - issues.iter().map(|i| i.severity.penalty()).sum::<f64>()
}

/// Merge service findings with static findings. Static issues already
/// reported by the service on the same file and line are dropped, and the
/// lower of the two scores wins.
pub fn corroborate(service: TypeResult, local: TypeResult) -> TypeResult {
  let mut merged = TypeResult::new(
    service.analysis_type,
    service.score.min(local.score),
    Provenance::Corroborated,
  );
  merged.suggestions = service.suggestions;
  merged.auto_fixable = service.auto_fixable;
  merged.duration_ms = service.duration_ms;

  let reported: Vec<(Option<String>, Option<u32>)> = service
    .issues
    .iter()
    .filter(|i| i.line.is_some())
    .map(|i| (i.file.clone(), i.line))
    .collect();
  merged.issues = service.issues;
  merged.issues.extend(
    local
      .issues
      .into_iter()
      .filter(|i| !reported.contains(&(i.file.clone(), i.line))),
  );
  merged
}
