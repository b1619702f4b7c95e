//! CLI command implementations

mod analyze;
mod config;
mod hook;

use std::io::Read;

use anyhow::{Context, Result};
use hookwise::Engine;
use hookwise_core::Config;
use serde::de::DeserializeOwned;

pub use analyze::cmd_analyze;
pub use config::cmd_config_show;
pub use hook::cmd_hook;

/// Read a JSON document from stdin. Empty input yields `None`.
fn read_stdin_json<T: DeserializeOwned>() -> Result<Option<T>> {
  let mut input = String::new();
  std::io::stdin()
    .read_to_string(&mut input)
    .context("Failed to read stdin")?;

  if input.trim().is_empty() {
    return Ok(None);
  }

  serde_json::from_str(&input).map(Some).context("Invalid JSON on stdin")
}

fn build_engine(config: Config) -> Result<Engine> {
  let provider = llm::create_provider().context("No analysis provider available")?;
  Ok(Engine::new(config, provider, None).with_default_hooks())
}
