//! Show the effective configuration

use anyhow::Result;
use hookwise_core::Config;

pub fn cmd_config_show(config: &Config) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(config)?);
  Ok(())
}
