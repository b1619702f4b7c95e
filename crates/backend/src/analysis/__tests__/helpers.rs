//! Shared fixtures for orchestrator tests.
//!
//! `ScriptedClient` stands in for the analysis service: each analysis type is
//! given a canned reply and every call is counted.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use hookwise_core::{
  AnalysisConfig, AnalysisRequest, AnalysisType, CacheConfig, FileInput, Issue, Provenance, Severity, TypeResult,
};
use llm::{AnalysisClient, AnalysisError};

use crate::{
  analysis::AnalysisOrchestrator,
  cache::{CacheService, MemorySharedStore, SharedStore},
  metrics::Metrics,
};

pub enum Reply {
  Score(f64),
  /// Score plus one issue of the given severity on line 1 of the first file
  Finding(f64, Severity),
  Fatal,
  Transient,
  Panic,
}

pub struct ScriptedClient {
  replies: HashMap<AnalysisType, Reply>,
  calls: AtomicUsize,
}

impl ScriptedClient {
  /// Every type scores 8.0 unless scripted otherwise.
  pub fn new() -> Self {
    Self {
      replies: HashMap::new(),
      calls: AtomicUsize::new(0),
    }
  }

  pub fn reply(mut self, analysis_type: AnalysisType, reply: Reply) -> Self {
    self.replies.insert(analysis_type, reply);
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl AnalysisClient for ScriptedClient {
  async fn analyze(
    &self,
    prompt: &str,
    files: &[FileInput],
    analysis_type: AnalysisType,
  ) -> Result<TypeResult, AnalysisError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    assert!(!prompt.is_empty());

    match self.replies.get(&analysis_type).unwrap_or(&Reply::Score(8.0)) {
      Reply::Score(score) => Ok(TypeResult::new(analysis_type, *score, Provenance::Structured)),
      Reply::Finding(score, severity) => {
        let mut result = TypeResult::new(analysis_type, *score, Provenance::Structured);
        result.issues.push(Issue {
          analysis_type,
          severity: *severity,
          message: format!("{} finding", analysis_type),
          file: files.first().map(|f| f.path.clone()),
          line: Some(1),
          rule: None,
          confidence: 0.9,
        });
        Ok(result)
      }
      Reply::Fatal => Err(AnalysisError::Fatal("authentication failed".to_string())),
      Reply::Transient => Err(AnalysisError::Transient {
        attempts: 4,
        message: "503 service unavailable".to_string(),
      }),
      Reply::Panic => panic!("scripted panic for {}", analysis_type),
    }
  }
}

pub struct TestContext {
  pub orchestrator: Arc<AnalysisOrchestrator>,
  pub client: Arc<ScriptedClient>,
  pub cache: Arc<CacheService>,
  pub metrics: Arc<Metrics>,
}

impl TestContext {
  /// Local-only cache.
  pub fn new(client: ScriptedClient) -> Self {
    Self::build(client, None)
  }

  /// Cache backed by an in-memory shared tier.
  pub fn with_shared(client: ScriptedClient) -> (Self, Arc<MemorySharedStore>) {
    let store = Arc::new(MemorySharedStore::new());
    let ctx = Self::build(client, Some(store.clone() as Arc<dyn SharedStore>));
    (ctx, store)
  }

  fn build(client: ScriptedClient, shared: Option<Arc<dyn SharedStore>>) -> Self {
    let client = Arc::new(client);
    let cache = Arc::new(CacheService::new(&CacheConfig::default(), shared));
    let metrics = Arc::new(Metrics::new());
    let orchestrator = Arc::new(AnalysisOrchestrator::new(
      client.clone() as Arc<dyn AnalysisClient>,
      cache.clone(),
      &AnalysisConfig::default(),
      metrics.clone(),
    ));
    Self {
      orchestrator,
      client,
      cache,
      metrics,
    }
  }
}

pub fn request(types: impl IntoIterator<Item = AnalysisType>) -> AnalysisRequest {
  AnalysisRequest::new(
    vec![FileInput::new("src/math.rs", "pub fn add(a: i32, b: i32) -> i32 {\n  a + b\n}\n").with_language("rust")],
    types,
  )
}
