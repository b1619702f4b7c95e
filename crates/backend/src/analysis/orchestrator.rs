//! Analysis orchestration: cache lookup, per-type fan-out, aggregation.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use hookwise_core::{
  AnalysisConfig, AnalysisRequest, AnalysisResult, AnalysisType, ErrorCategory, ErrorEntry, cache_key,
};
use llm::{AnalysisClient, AnalysisError, build_analysis_prompt};
use tokio::{sync::Semaphore, time::Instant};
use tracing::{debug, info, warn};

use super::{
  aggregate::{TypeOutcome, aggregate},
  static_check::{StaticChecker, corroborate},
};
use crate::{
  cache::{CacheService, SetOptions},
  metrics::Metrics,
};

pub const TAG_ANALYSIS: &str = "analysis";

pub fn type_tag(analysis_type: AnalysisType) -> String {
  format!("type:{}", analysis_type)
}

pub fn file_tag(path: &str) -> String {
  format!("file:{}", path)
}

/// Raised only when a request cannot be dispatched at all. Failures of
/// individual analysis types are itemized in [`AnalysisResult::errors`].
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
  #[error("invalid analysis request: {0}")]
  InvalidRequest(#[source] hookwise_core::Error),
  #[error("failed to derive cache key: {0}")]
  CacheKey(#[source] hookwise_core::Error),
}

pub struct AnalysisOrchestrator {
  client: Arc<dyn AnalysisClient>,
  cache: Arc<CacheService>,
  checker: Arc<StaticChecker>,
  permits: Arc<Semaphore>,
  metrics: Arc<Metrics>,
}

impl AnalysisOrchestrator {
  pub fn new(
    client: Arc<dyn AnalysisClient>,
    cache: Arc<CacheService>,
    config: &AnalysisConfig,
    metrics: Arc<Metrics>,
  ) -> Self {
    Self {
      client,
      cache,
      checker: Arc::new(StaticChecker::new()),
      permits: Arc::new(Semaphore::new(config.max_concurrent_analyses.max(1))),
      metrics,
    }
  }

  pub fn cache(&self) -> &Arc<CacheService> {
    &self.cache
  }

  pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalyzeError> {
    let start = Instant::now();
    request.validate().map_err(AnalyzeError::InvalidRequest)?;
    let key = cache_key(request).map_err(AnalyzeError::CacheKey)?;

    if request.options.force_refresh {
      debug!(key = %key, "Force refresh, skipping cache lookup");
    } else if let Some(cached) = self.cache.get::<AnalysisResult>(&key).await {
      self.metrics.increment("analysis.cache", "hit", 1);
      debug!(key = %key, score = cached.overall_score, "Returning cached analysis");
      return Ok(cached);
    } else {
      self.metrics.increment("analysis.cache", "miss", 1);
    }

    debug!(
      key = %key,
      files = request.files.len(),
      types = ?request.analysis_types,
      "Dispatching analysis"
    );

    let request_arc = Arc::new(request.clone());
    let tasks: Vec<_> = request
      .analysis_types
      .iter()
      .map(|&analysis_type| {
        let client = self.client.clone();
        let checker = self.checker.clone();
        let permits = self.permits.clone();
        let request = request_arc.clone();
        async move {
          let handle = tokio::spawn(run_type(client, checker, permits, request, analysis_type));
          match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
              warn!(analysis_type = %analysis_type, err = %e, "Analysis task aborted");
              TypeOutcome::Failed(ErrorEntry {
                analysis_type,
                category: ErrorCategory::Internal,
                message: format!("analysis task failed: {}", e),
              })
            }
          }
        }
      })
      .collect();

    let outcomes = join_all(tasks).await;

    for outcome in &outcomes {
      let analysis_type = match outcome {
        TypeOutcome::Succeeded(r) => r.analysis_type,
        TypeOutcome::Failed(e) | TypeOutcome::FailedWithFindings(e, _) => e.analysis_type,
      };
      let name = if outcome.is_success() { "analysis.type.success" } else { "analysis.type.failure" };
      self.metrics.increment(name, analysis_type.as_str(), 1);
    }

    let mut result = aggregate(outcomes, &request.options);
    let elapsed = start.elapsed();
    result.metadata.insert("cache_key".to_string(), serde_json::json!(key));
    result.metadata.insert("file_count".to_string(), serde_json::json!(request.files.len()));
    result
      .metadata
      .insert("duration_ms".to_string(), serde_json::json!(elapsed.as_millis() as u64));

    if result.is_complete() {
      let ttl = request
        .options
        .cache_ttl_secs
        .map_or_else(|| self.cache.default_ttl(), Duration::from_secs);
      let mut options = SetOptions::default().ttl(ttl).tag(TAG_ANALYSIS);
      for analysis_type in &request.analysis_types {
        options = options.tag(type_tag(*analysis_type));
      }
      for file in &request.files {
        options = options.tag(file_tag(&file.path));
      }

      if let Err(e) = self.cache.set(&key, &result, options).await {
        warn!(key = %key, err = %e, "Failed to cache analysis result");
      }
    } else {
      debug!(
        key = %key,
        succeeded = result.per_type.len(),
        failed = result.errors.len(),
        "Analysis incomplete, not caching"
      );
    }

    self.metrics.record_duration("analysis.analyze", "all", elapsed);
    info!(
      score = result.overall_score,
      succeeded = result.per_type.len(),
      failed = result.errors.len(),
      issues = result.issues.len(),
      elapsed_ms = elapsed.as_millis() as u64,
      "Analysis complete"
    );

    Ok(result)
  }

  /// Drop every cached result that covered any of `paths`.
  pub async fn invalidate_files(&self, paths: &[String]) -> usize {
    let tags: Vec<String> = paths.iter().map(|p| file_tag(p)).collect();
    self.cache.delete_by_tags(&tags).await
  }
}

async fn run_type(
  client: Arc<dyn AnalysisClient>,
  checker: Arc<StaticChecker>,
  permits: Arc<Semaphore>,
  request: Arc<AnalysisRequest>,
  analysis_type: AnalysisType,
) -> TypeOutcome {
  let Ok(_permit) = permits.acquire_owned().await else {
    return TypeOutcome::Failed(ErrorEntry {
      analysis_type,
      category: ErrorCategory::Internal,
      message: "analysis admission closed".to_string(),
    });
  };

  let prompt = build_analysis_prompt(analysis_type, &request.options, &request.context);
  let service = client
    .analyze(&prompt, &request.files, analysis_type)
    .await;

  if analysis_type.requires_corroboration() {
    let local = checker.security_result(&request.files);
    return match service {
      Ok(result) => TypeOutcome::Succeeded(corroborate(result, local)),
      Err(e) => {
        warn!(
          analysis_type = %analysis_type,
          err = %e,
          findings = local.issues.len(),
          "Analysis service failed, reporting static findings unscored"
        );
        let error = error_entry(analysis_type, &e);
        if local.issues.is_empty() {
          TypeOutcome::Failed(error)
        } else {
          TypeOutcome::FailedWithFindings(error, local.issues)
        }
      }
    };
  }

  match service {
    Ok(result) => TypeOutcome::Succeeded(result),
    Err(e) => {
      warn!(analysis_type = %analysis_type, err = %e, "Analysis type failed");
      TypeOutcome::Failed(error_entry(analysis_type, &e))
    }
  }
}

fn error_entry(analysis_type: AnalysisType, err: &AnalysisError) -> ErrorEntry {
  ErrorEntry {
    analysis_type,
    category: err.category(),
    message: err.to_string(),
  }
}
