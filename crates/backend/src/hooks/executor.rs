//! Concurrent hook execution.
//!
//! `execute` snapshots the handlers registered for a hook type and runs each
//! on its own task under its own timeout. Every handler yields exactly one
//! [`HookResult`], in snapshot order, whatever the mix of successes, errors,
//! panics and timeouts.
//!
//! A shared semaphore caps how many handlers run at once across all
//! executions. Waiting for a permit does not count against a handler's
//! timeout.

use std::{any::Any, sync::Arc, time::Duration};

use futures::future::join_all;
use hookwise_core::{HandlerOutcome, HookContext, HookErrorKind, HookResult, HookType, HooksConfig};
use tokio::{
  sync::Semaphore,
  time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use super::{HookRegistry, RegisteredHandler};
use crate::metrics::Metrics;

pub struct HookExecutor {
  registry: Arc<HookRegistry>,
  config: HooksConfig,
  permits: Arc<Semaphore>,
  metrics: Arc<Metrics>,
}

impl HookExecutor {
  pub fn new(registry: Arc<HookRegistry>, config: HooksConfig, metrics: Arc<Metrics>) -> Self {
    Self {
      permits: Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1))),
      registry,
      config,
      metrics,
    }
  }

  pub fn registry(&self) -> &Arc<HookRegistry> {
    &self.registry
  }

  /// Handler override, then the per-name configured timeout, then the default.
  fn timeout_for(&self, handler: &RegisteredHandler) -> Duration {
    handler
      .timeout_override()
      .or_else(|| self.config.timeout_for(handler.name()))
      .unwrap_or_else(|| self.config.default_timeout())
  }

  /// Run every handler registered for `hook_type` and return one result per
  /// handler, in registration order.
  ///
  /// With `hooks.enabled = false` nothing runs and the result is empty, even
  /// if handlers are registered.
  pub async fn execute(&self, hook_type: &HookType, context: HookContext) -> Vec<HookResult> {
    if !self.config.enabled {
      debug!(hook = %hook_type, "Hooks disabled, skipping execution");
      return Vec::new();
    }

    let start = Instant::now();
    let snapshot = self.registry.handlers(hook_type);
    if snapshot.is_empty() {
      debug!(hook = %hook_type, "No handlers registered");
      return Vec::new();
    }

    debug!(
      hook = %hook_type,
      handlers = snapshot.len(),
      files = context.files.len(),
      "Executing hook handlers"
    );

    let context = Arc::new(context);
    let futures: Vec<_> = snapshot
      .into_iter()
      .map(|handler| {
        handler.mark_active();
        let limit = self.timeout_for(&handler);
        run_handler(handler, context.clone(), self.permits.clone(), limit)
      })
      .collect();

    let results = join_all(futures).await;

    let succeeded = results.iter().filter(|r| r.success).count();
    let timed_out = results.iter().filter(|r| r.is_timeout()).count();
    let failed = results.len() - succeeded;
    let label = hook_type.as_str();
    let elapsed = start.elapsed();

    self.metrics.increment("hook.executions", label, 1);
    self.metrics.increment("hook.handler.success", label, succeeded as u64);
    self.metrics.increment("hook.handler.failure", label, failed as u64);
    self.metrics.increment("hook.handler.timeout", label, timed_out as u64);
    self.metrics.record_duration("hook.execute", label, elapsed);

    info!(
      hook = %hook_type,
      handlers = results.len(),
      succeeded,
      failed,
      timed_out,
      elapsed_ms = elapsed.as_millis() as u64,
      "Hook execution complete"
    );

    results
  }
}

async fn run_handler(
  handler: Arc<RegisteredHandler>,
  context: Arc<HookContext>,
  permits: Arc<Semaphore>,
  limit: Duration,
) -> HookResult {
  let _permit = match permits.acquire_owned().await {
    Ok(permit) => permit,
    Err(_) => {
      return failure(&handler, HookErrorKind::Execution {
        message: "executor is shutting down".to_string(),
      }, 0);
    }
  };

  let start = Instant::now();
  let task = tokio::spawn({
    let handler = handler.clone();
    async move { handler.handler.handle(&context).await }
  });
  let abort = task.abort_handle();

  let outcome = timeout(limit, task).await;
  let duration_ms = start.elapsed().as_millis() as u64;

  match outcome {
    Ok(Ok(Ok(HandlerOutcome { success, metadata }))) => {
      debug!(handler = %handler.name(), success, duration_ms, "Handler completed");
      HookResult {
        handler_id: handler.id,
        handler: handler.name().to_string(),
        success,
        error: None,
        metadata,
        duration_ms,
      }
    }
    Ok(Ok(Err(e))) => {
      warn!(handler = %handler.name(), err = %e, duration_ms, "Handler failed");
      failure(&handler, HookErrorKind::Execution { message: e.to_string() }, duration_ms)
    }
    Ok(Err(join_err)) => {
      let message = if join_err.is_panic() {
        format!("handler panicked: {}", panic_message(join_err.into_panic()))
      } else {
        "handler task was cancelled".to_string()
      };
      warn!(handler = %handler.name(), err = %message, duration_ms, "Handler aborted");
      failure(&handler, HookErrorKind::Execution { message }, duration_ms)
    }
    Err(_) => {
      abort.abort();
      let after_ms = limit.as_millis() as u64;
      warn!(handler = %handler.name(), timeout_ms = after_ms, "Handler timed out");
      failure(&handler, HookErrorKind::Timeout { after_ms }, duration_ms)
    }
  }
}

fn failure(handler: &RegisteredHandler, error: HookErrorKind, duration_ms: u64) -> HookResult {
  HookResult {
    handler_id: handler.id,
    handler: handler.name().to_string(),
    success: false,
    error: Some(error),
    metadata: serde_json::Map::new(),
    duration_ms,
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
