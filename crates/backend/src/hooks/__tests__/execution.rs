//! Hook execution: fault isolation, timeouts, ordering and concurrency limits.

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, sync::Arc, time::Duration};

  use hookwise_core::{ChangeKind, CommitInfo, FileChange, HookContext, HookErrorKind, HookType, HooksConfig};
  use pretty_assertions::assert_eq;
  use tokio::time::Instant;

  use crate::hooks::{
    HandlerConfig, HandlerState,
    __tests__::helpers::{Behavior, ExecutorContext, TestHandler},
  };

  fn context() -> HookContext {
    HookContext::new(
      vec![FileChange {
        path: "src/lib.rs".to_string(),
        content: Some("pub fn f() {}".to_string()),
        diff: None,
        language: Some("rust".to_string()),
        change_kind: ChangeKind::Modified,
      }],
      CommitInfo::default(),
    )
  }

  #[tokio::test(start_paused = true)]
  async fn test_every_handler_reports_in_registration_order() {
    let ctx = ExecutorContext::new(HooksConfig::default());
    let hook = HookType::PreCommit;

    ctx.registry.register(hook.clone(), TestHandler::new("ok", Behavior::Pass), None);
    ctx
      .registry
      .register(hook.clone(), TestHandler::new("gate", Behavior::Reject("too risky")), None);
    ctx
      .registry
      .register(hook.clone(), TestHandler::new("broken", Behavior::Fail("disk full")), None);
    ctx
      .registry
      .register(hook.clone(), TestHandler::new("crashy", Behavior::Panic("boom")), None);
    ctx.registry.register(
      hook.clone(),
      TestHandler::new("stuck", Behavior::Sleep(Duration::from_secs(60))),
      Some(HandlerConfig::with_timeout(Duration::from_millis(500))),
    );

    let results = ctx.executor.execute(&hook, context()).await;

    let names: Vec<&str> = results.iter().map(|r| r.handler.as_str()).collect();
    assert_eq!(names, vec!["ok", "gate", "broken", "crashy", "stuck"]);

    assert!(results[0].success);
    assert!(results[0].error.is_none());

    // Deliberate rejection: unsuccessful but not an error
    assert!(!results[1].success);
    assert!(results[1].error.is_none());
    assert_eq!(results[1].metadata["reason"], "too risky");

    assert_eq!(
      results[2].error,
      Some(HookErrorKind::Execution {
        message: "disk full".to_string()
      })
    );

    match &results[3].error {
      Some(HookErrorKind::Execution { message }) => assert!(message.contains("boom"), "{}", message),
      other => panic!("expected execution error, got {:?}", other),
    }

    assert_eq!(results[4].error, Some(HookErrorKind::Timeout { after_ms: 500 }));
    assert!(results[4].is_timeout());
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_bounds_execution_without_affecting_siblings() {
    let ctx = ExecutorContext::new(HooksConfig::default());
    let hook = HookType::PrePush;
    let fast = TestHandler::new("fast", Behavior::Sleep(Duration::from_millis(100)));

    ctx.registry.register(
      hook.clone(),
      TestHandler::new("slow", Behavior::Sleep(Duration::from_secs(5))),
      Some(HandlerConfig::with_timeout(Duration::from_secs(1))),
    );
    ctx.registry.register(hook.clone(), fast.clone(), None);

    let start = Instant::now();
    let results = ctx.executor.execute(&hook, context()).await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    assert!(results[0].is_timeout());
    assert!(results[1].success);
    assert_eq!(fast.runs(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_configured_timeout_by_handler_name() {
    let config = HooksConfig {
      timeouts: HashMap::from([("sleepy".to_string(), 200)]),
      ..Default::default()
    };
    let ctx = ExecutorContext::new(config);
    ctx.registry.register(
      HookType::PreCommit,
      TestHandler::new("sleepy", Behavior::Sleep(Duration::from_secs(1))),
      None,
    );
    ctx.registry.register(
      HookType::PreCommit,
      TestHandler::new("patient", Behavior::Sleep(Duration::from_secs(1))),
      None,
    );

    let results = ctx.executor.execute(&HookType::PreCommit, context()).await;

    assert_eq!(results[0].error, Some(HookErrorKind::Timeout { after_ms: 200 }));
    // Falls back to the 30s default
    assert!(results[1].success);
  }

  #[tokio::test(start_paused = true)]
  async fn test_waiting_for_a_permit_does_not_count_against_timeout() {
    let config = HooksConfig {
      max_concurrent_handlers: 1,
      ..Default::default()
    };
    let ctx = ExecutorContext::new(config);
    for name in ["first", "second"] {
      ctx.registry.register(
        HookType::PreCommit,
        TestHandler::new(name, Behavior::Sleep(Duration::from_secs(1))),
        Some(HandlerConfig::with_timeout(Duration::from_millis(1500))),
      );
    }

    let start = Instant::now();
    let results = ctx.executor.execute(&HookType::PreCommit, context()).await;

    // Serialized by the single permit
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert!(results.iter().all(|r| r.success), "{:?}", results);
  }

  #[tokio::test]
  async fn test_every_handler_sees_the_same_context() {
    let ctx = ExecutorContext::new(HooksConfig::default());
    let a = TestHandler::new("a", Behavior::Pass);
    let b = TestHandler::new("b", Behavior::Fail("nope"));
    ctx.registry.register(HookType::PostCommit, a.clone(), None);
    ctx.registry.register(HookType::PostCommit, b.clone(), None);

    ctx.executor.execute(&HookType::PostCommit, context()).await;

    assert_eq!(a.files_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(b.files_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_no_handlers_or_disabled_yields_nothing() {
    let ctx = ExecutorContext::new(HooksConfig::default());
    assert!(ctx.executor.execute(&HookType::PostMerge, context()).await.is_empty());

    let disabled = ExecutorContext::new(HooksConfig {
      enabled: false,
      ..Default::default()
    });
    let handler = TestHandler::new("a", Behavior::Pass);
    disabled.registry.register(HookType::PreCommit, handler.clone(), None);

    assert!(disabled.executor.execute(&HookType::PreCommit, context()).await.is_empty());
    assert_eq!(handler.runs(), 0);
  }

  #[tokio::test]
  async fn test_unregistered_handler_is_not_executed() {
    let ctx = ExecutorContext::new(HooksConfig::default());
    let kept = TestHandler::new("kept", Behavior::Pass);
    let removed = TestHandler::new("removed", Behavior::Pass);
    ctx.registry.register(HookType::PreCommit, kept.clone(), None);
    let id = ctx.registry.register(HookType::PreCommit, removed.clone(), None);
    assert!(ctx.registry.unregister(&HookType::PreCommit, id));

    let results = ctx.executor.execute(&HookType::PreCommit, context()).await;

    assert_eq!(results.len(), 1);
    assert_eq!(removed.runs(), 0);
    assert_eq!(
      ctx.registry.handlers(&HookType::PreCommit)[0].state(),
      HandlerState::Active
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_metrics_are_recorded_per_hook_type() {
    let ctx = ExecutorContext::new(HooksConfig::default());
    let hook = HookType::Custom("deploy-check".to_string());
    ctx.registry.register(hook.clone(), TestHandler::new("ok", Behavior::Pass), None);
    ctx.registry.register(hook.clone(), TestHandler::new("bad", Behavior::Fail("x")), None);
    ctx.registry.register(
      hook.clone(),
      TestHandler::new("slow", Behavior::Sleep(Duration::from_secs(10))),
      Some(HandlerConfig::with_timeout(Duration::from_secs(1))),
    );

    ctx.executor.execute(&hook, context()).await;
    ctx.executor.execute(&hook, context()).await;

    assert_eq!(ctx.metrics.counter("hook.executions", "deploy-check"), 2);
    assert_eq!(ctx.metrics.counter("hook.handler.success", "deploy-check"), 2);
    assert_eq!(ctx.metrics.counter("hook.handler.failure", "deploy-check"), 4);
    assert_eq!(ctx.metrics.counter("hook.handler.timeout", "deploy-check"), 2);
    assert_eq!(ctx.metrics.duration("hook.execute", "deploy-check").count, 2);
  }

  #[tokio::test]
  async fn test_concurrent_executions_are_independent() {
    let ctx = Arc::new(ExecutorContext::new(HooksConfig::default()));
    let handler = TestHandler::new("counter", Behavior::Pass);
    ctx.registry.register(HookType::PreCommit, handler.clone(), None);

    let runs: Vec<_> = (0..8)
      .map(|_| {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.executor.execute(&HookType::PreCommit, context()).await })
      })
      .collect();

    for run in runs {
      let results = run.await.unwrap();
      assert_eq!(results.len(), 1);
      assert!(results[0].success);
    }
    assert_eq!(handler.runs(), 8);
  }
}
