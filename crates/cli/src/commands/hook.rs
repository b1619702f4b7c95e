//! Hook command: run every handler registered for a git lifecycle stage

use anyhow::Result;
use hookwise_core::{CommitInfo, Config, HookContext, HookResult, HookType};
use serde::Serialize;
use tracing::{info, warn};

use super::{build_engine, read_stdin_json};

#[derive(Serialize)]
struct HookReport<'a> {
  hook: &'a HookType,
  blocked: bool,
  results: &'a [HookResult],
}

/// Whether the results should stop the git operation.
///
/// Only deliberate rejections block. A handler that errored, panicked or
/// timed out is reported but lets the operation through.
pub fn is_blocked(hook_type: &HookType, results: &[HookResult]) -> bool {
  hook_type.is_blocking() && results.iter().any(|r| !r.success && r.error.is_none())
}

/// Handle a hook event. Reads a `HookContext` from stdin and returns whether
/// the operation is blocked.
pub async fn cmd_hook(name: &str, config: Config) -> Result<bool> {
  let hook_type = HookType::from(name);
  let context =
    read_stdin_json::<HookContext>()?.unwrap_or_else(|| HookContext::new(Vec::new(), CommitInfo::default()));

  let engine = build_engine(config)?;
  let results = engine.execute(&hook_type, context).await;
  let blocked = is_blocked(&hook_type, &results);

  for result in &results {
    if let Some(error) = &result.error {
      warn!(handler = %result.handler, error = %error, "Handler did not complete");
    }
  }
  info!(hook = %hook_type, handlers = results.len(), blocked, "Hook finished");

  let report = HookReport {
    hook: &hook_type,
    blocked,
    results: &results,
  };
  println!("{}", serde_json::to_string(&report)?);

  Ok(blocked)
}
