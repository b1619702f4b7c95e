//! Hook registry and executor.
//!
//! ## Module Structure
//!
//! ```text
//! hooks/
//! ├── mod.rs            # HookHandler trait, handler errors and config
//! ├── registry.rs       # Per-hook-type handler sets, lifecycle notifications
//! ├── executor.rs       # Concurrent, fault-isolated handler execution
//! └── analysis_hook.rs  # Built-in handler gating on analysis results
//! ```
//!
//! Handlers never see each other: each one runs on its own task with its own
//! timeout, and a failure, panic or timeout in one never affects a sibling.

mod analysis_hook;
mod executor;
mod registry;

#[cfg(test)]
mod __tests__;

use std::time::Duration;

use async_trait::async_trait;
use hookwise_core::{HandlerOutcome, HookContext};

pub use analysis_hook::AnalysisHook;
pub use executor::HookExecutor;
pub use registry::{HandlerState, HookRegistry, RegisteredHandler, RegistryEvent};

use crate::analysis::AnalyzeError;

/// A named unit of logic bound to a hook type.
#[async_trait]
pub trait HookHandler: Send + Sync {
  fn name(&self) -> &str;

  /// Handler-specific timeout; takes precedence over configured timeouts.
  fn timeout(&self) -> Option<Duration> {
    None
  }

  async fn handle(&self, context: &HookContext) -> Result<HandlerOutcome, HandlerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
  #[error("{0}")]
  Failed(String),
  #[error(transparent)]
  Analysis(#[from] AnalyzeError),
}

impl HandlerError {
  pub fn failed(msg: impl Into<String>) -> Self {
    Self::Failed(msg.into())
  }
}

/// Options given at registration time.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
  /// Overrides both the handler's own timeout and configured timeouts
  pub timeout: Option<Duration>,
}

impl HandlerConfig {
  pub fn with_timeout(timeout: Duration) -> Self {
    Self { timeout: Some(timeout) }
  }
}
