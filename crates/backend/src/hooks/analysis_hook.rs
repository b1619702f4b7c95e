//! Built-in handler that gates git operations on analysis results.

use std::sync::Arc;

use async_trait::async_trait;
use hookwise_core::{
  AnalysisConfig, AnalysisOptions, AnalysisRequest, FileInput, HandlerOutcome, HookContext, Severity,
};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{HandlerError, HookHandler};
use crate::analysis::AnalysisOrchestrator;

/// Runs the configured analysis types over the changed files and rejects the
/// operation when the overall score falls below `quality_threshold` or any
/// critical issue is found.
///
/// Fails open: if no analysis type could run and local checks found nothing
/// critical, the handler passes and marks its metadata `degraded`.
pub struct AnalysisHook {
  orchestrator: Arc<AnalysisOrchestrator>,
  config: AnalysisConfig,
}

impl AnalysisHook {
  pub const NAME: &'static str = "analysis";

  pub fn new(orchestrator: Arc<AnalysisOrchestrator>, config: AnalysisConfig) -> Self {
    Self { orchestrator, config }
  }

  /// `None` when nothing in the context has content to analyze.
  ///
  /// Trigger options understood here: `force_refresh` (bool) and `context`
  /// (object, forwarded as the request context).
  fn build_request(&self, context: &HookContext) -> Option<AnalysisRequest> {
    let files: Vec<FileInput> = context
      .files
      .iter()
      .filter(|f| f.change_kind.has_content())
      .filter_map(|f| {
        let text = f.analyzable_text()?;
        let input = FileInput::new(f.path.clone(), text);
        Some(match &f.language {
          Some(lang) => input.with_language(lang.clone()),
          None => input,
        })
      })
      .collect();

    if files.is_empty() {
      return None;
    }

    let options = AnalysisOptions {
      include_fix_suggestions: self.config.include_fix_suggestions,
      confidence_threshold: self.config.confidence_threshold,
      force_refresh: context
        .options
        .get("force_refresh")
        .and_then(|v| v.as_bool())
        .unwrap_or(false),
      cache_ttl_secs: None,
    };

    let mut request = AnalysisRequest::new(files, self.config.types.iter().copied()).with_options(options);
    if let Some(extra) = context.options.get("context").and_then(|v| v.as_object()) {
      for (key, value) in extra {
        request = request.with_context(key.clone(), value.clone());
      }
    }
    Some(request)
  }
}

#[async_trait]
impl HookHandler for AnalysisHook {
  fn name(&self) -> &str {
    Self::NAME
  }

  async fn handle(&self, context: &HookContext) -> Result<HandlerOutcome, HandlerError> {
    let Some(request) = self.build_request(context) else {
      debug!("No analyzable files in hook context");
      return Ok(HandlerOutcome::passed().with_metadata("skipped", "no analyzable files"));
    };

    let result = self.orchestrator.analyze(&request).await?;
    let threshold = self.config.quality_threshold;
    let critical = result.count_by_severity(Severity::Critical);

    let outcome = if critical > 0 {
      HandlerOutcome::rejected(format!("{} critical issue(s) found", critical))
    } else if !result.succeeded() {
      warn!(errors = result.errors.len(), "No analysis type succeeded, passing without a verdict");
      HandlerOutcome::passed().with_metadata("degraded", true)
    } else if result.overall_score < threshold {
      HandlerOutcome::rejected(format!(
        "overall score {:.1} is below the quality threshold {:.1}",
        result.overall_score, threshold
      ))
    } else {
      HandlerOutcome::passed()
    };

    let mut outcome = outcome
      .with_metadata("overall_score", result.overall_score)
      .with_metadata("threshold", threshold)
      .with_metadata(
        "issues",
        json!({
          "critical": critical,
          "high": result.count_by_severity(Severity::High),
          "medium": result.count_by_severity(Severity::Medium),
          "low": result.count_by_severity(Severity::Low),
          "info": result.count_by_severity(Severity::Info),
        }),
      )
      .with_metadata("errors", serde_json::to_value(&result.errors).unwrap_or_default());

    if self.config.auto_fix && !result.auto_fixable.is_empty() {
      outcome = outcome.with_metadata("auto_fixable", serde_json::to_value(&result.auto_fixable).unwrap_or_default());
    }

    info!(
      score = result.overall_score,
      threshold,
      critical,
      passed = outcome.success,
      "Analysis hook verdict"
    );
    Ok(outcome)
  }
}
