//! Test handlers with fixed behavior.

use std::{
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use hookwise_core::{HandlerOutcome, HookContext, HooksConfig};

use crate::{
  hooks::{HandlerError, HookExecutor, HookHandler, HookRegistry},
  metrics::Metrics,
};

pub enum Behavior {
  Pass,
  Reject(&'static str),
  Fail(&'static str),
  Panic(&'static str),
  /// Sleep, then pass
  Sleep(Duration),
}

pub struct TestHandler {
  name: &'static str,
  behavior: Behavior,
  pub runs: AtomicUsize,
  pub files_seen: AtomicUsize,
}

impl TestHandler {
  pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
    Arc::new(Self {
      name,
      behavior,
      runs: AtomicUsize::new(0),
      files_seen: AtomicUsize::new(0),
    })
  }

  pub fn runs(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl HookHandler for TestHandler {
  fn name(&self) -> &str {
    self.name
  }

  async fn handle(&self, context: &HookContext) -> Result<HandlerOutcome, HandlerError> {
    self.runs.fetch_add(1, Ordering::SeqCst);
    self.files_seen.store(context.files.len(), Ordering::SeqCst);

    match &self.behavior {
      Behavior::Pass => Ok(HandlerOutcome::passed().with_metadata("handler", self.name)),
      Behavior::Reject(reason) => Ok(HandlerOutcome::rejected(*reason)),
      Behavior::Fail(msg) => Err(HandlerError::failed(*msg)),
      Behavior::Panic(msg) => panic!("{}", msg),
      Behavior::Sleep(duration) => {
        tokio::time::sleep(*duration).await;
        Ok(HandlerOutcome::passed())
      }
    }
  }
}

pub struct ExecutorContext {
  pub registry: Arc<HookRegistry>,
  pub metrics: Arc<Metrics>,
  pub executor: HookExecutor,
}

impl ExecutorContext {
  pub fn new(config: HooksConfig) -> Self {
    let registry = Arc::new(HookRegistry::new());
    let metrics = Arc::new(Metrics::new());
    let executor = HookExecutor::new(registry.clone(), config, metrics.clone());
    Self {
      registry,
      metrics,
      executor,
    }
  }
}
