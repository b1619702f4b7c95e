//! Provider seam for the external analysis service.
//!
//! A provider performs exactly one request/response exchange. Budgets,
//! retries and response parsing live in [`crate::ServiceClient`], so
//! providers stay thin and are easy to fake in tests.

use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::{InferenceRequest, InferenceResponse, LlmError};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// A backend able to answer one inference request.
///
/// Errors should be classified precisely: [`LlmError::is_transient`] decides
/// whether the client retries, and [`LlmError::never_reached_provider`]
/// decides whether the rate-limit slot is refunded.
#[async_trait]
pub trait LlmProvider: Send + Sync + DynClone {
  /// The name of this provider (for logging/identification)
  fn name(&self) -> &str;

  /// Check if this provider is available/configured
  fn is_available(&self) -> bool;

  /// Send one request and wait for the complete response
  async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse>;
}

dyn_clone::clone_trait_object!(LlmProvider);
