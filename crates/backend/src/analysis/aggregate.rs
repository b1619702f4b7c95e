//! Aggregation of per-type outcomes into one [`AnalysisResult`].

use std::collections::BTreeMap;

use hookwise_core::{AnalysisOptions, AnalysisResult, ErrorEntry, Issue, NEUTRAL_SCORE, TypeResult};

/// Outcome of one per-type analysis task.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeOutcome {
  Succeeded(TypeResult),
  Failed(ErrorEntry),
  /// The service call failed but local checks still found issues. The type
  /// counts as failed; the issues are reported without a score.
  FailedWithFindings(ErrorEntry, Vec<Issue>),
}

impl TypeOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Succeeded(_))
  }
}

/// Mean of successful scores, or [`NEUTRAL_SCORE`] when nothing succeeded.
pub fn overall_score(per_type: &[TypeResult]) -> f64 {
  if per_type.is_empty() {
    return NEUTRAL_SCORE;
  }
  per_type.iter().map(|r| r.score).sum::<f64>() / per_type.len() as f64
}

/// Flatten outcomes, in the order given, applying option filtering to each
/// successful result first. Only successful types enter `per_type` and the
/// score.
pub fn aggregate(outcomes: Vec<TypeOutcome>, options: &AnalysisOptions) -> AnalysisResult {
  let mut per_type = Vec::new();
  let mut errors = Vec::new();
  let mut fallback_issues = Vec::new();

  for outcome in outcomes {
    match outcome {
      TypeOutcome::Succeeded(result) => per_type.push(result),
      TypeOutcome::Failed(error) => errors.push(error),
      TypeOutcome::FailedWithFindings(error, issues) => {
        errors.push(error);
        fallback_issues.extend(issues);
      }
    }
  }

  for result in &mut per_type {
    result.apply_options(options);
  }
  fallback_issues.retain(|i| i.confidence >= options.confidence_threshold);

  let issues = per_type
    .iter()
    .flat_map(|r| r.issues.iter().cloned())
    .chain(fallback_issues.iter().cloned())
    .collect();
  let suggestions = per_type.iter().flat_map(|r| r.suggestions.iter().cloned()).collect();
  let auto_fixable = per_type.iter().flat_map(|r| r.auto_fixable.iter().cloned()).collect();

  let mut metadata = BTreeMap::new();
  metadata.insert("types_succeeded".to_string(), serde_json::json!(per_type.len()));
  metadata.insert("types_failed".to_string(), serde_json::json!(errors.len()));
  if !fallback_issues.is_empty() {
    metadata.insert("unscored_issues".to_string(), serde_json::json!(fallback_issues.len()));
  }

  AnalysisResult {
    overall_score: overall_score(&per_type),
    per_type,
    issues,
    suggestions,
    auto_fixable,
    errors,
    metadata,
  }
}
