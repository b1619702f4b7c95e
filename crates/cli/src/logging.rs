//! Logging setup for the hookwise binary
//!
//! stdout carries JSON results, so console logs always go to stderr.

use std::path::PathBuf;

use hookwise_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Directory for log files (respects HOOKWISE_DATA_DIR)
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("HOOKWISE_DATA_DIR") {
    return PathBuf::from(dir);
  }
  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("hookwise")
}

/// Parse log level from config string
fn parse_log_level(level: &str) -> tracing::level_filters::LevelFilter {
  use tracing::level_filters::LevelFilter;

  match level.to_lowercase().as_str() {
    "off" => LevelFilter::OFF,
    "error" => LevelFilter::ERROR,
    "warn" => LevelFilter::WARN,
    "info" => LevelFilter::INFO,
    "debug" => LevelFilter::DEBUG,
    "trace" => LevelFilter::TRACE,
    _ => LevelFilter::INFO,
  }
}

fn init_console_logging(env_filter: EnvFilter) {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_writer(std::io::stderr)
    .init();
}

/// Initialize logging from config. RUST_LOG overrides the configured level.
///
/// Returns the guard that must be kept alive for the duration of the program
/// when logging to a file.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
  let env_filter = EnvFilter::builder()
    .with_default_directive(parse_log_level(&config.log_level).into())
    .from_env_lossy();

  if !config.log_to_file {
    init_console_logging(env_filter);
    return None;
  }

  let log_dir = data_dir();
  if std::fs::create_dir_all(&log_dir).is_err() {
    // Fall back to console-only logging
    init_console_logging(env_filter);
    return None;
  }

  let file_appender = match config.log_rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(&log_dir, "hookwise.log"),
    "never" => tracing_appender::rolling::never(&log_dir, "hookwise.log"),
    _ => tracing_appender::rolling::daily(&log_dir, "hookwise.log"),
  };

  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
