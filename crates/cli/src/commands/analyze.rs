//! Analyze command: run an analysis request directly, outside any hook

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use hookwise_core::{AnalysisOptions, AnalysisRequest, AnalysisType, Config, FileInput};

use super::{build_engine, read_stdin_json};

/// Build a request from files on disk, using `types` or the configured
/// defaults.
fn request_from_paths(paths: &[PathBuf], types: &[AnalysisType], config: &Config) -> Result<AnalysisRequest> {
  let files = paths
    .iter()
    .map(|path| -> Result<FileInput> {
      let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
      Ok(FileInput::new(path.to_string_lossy(), content))
    })
    .collect::<Result<Vec<_>>>()?;

  let types = if types.is_empty() { config.analysis.types.as_slice() } else { types };
  let options = AnalysisOptions {
    include_fix_suggestions: config.analysis.include_fix_suggestions,
    confidence_threshold: config.analysis.confidence_threshold,
    ..Default::default()
  };
  Ok(AnalysisRequest::new(files, types.iter().copied()).with_options(options))
}

/// Analyze `paths`, or the `AnalysisRequest` JSON on stdin when no paths are
/// given, and print the result.
pub async fn cmd_analyze(paths: Vec<PathBuf>, types: Vec<AnalysisType>, force: bool, config: Config) -> Result<()> {
  let mut request = if paths.is_empty() {
    match read_stdin_json::<AnalysisRequest>()? {
      Some(request) => request,
      None => bail!("No files given and no analysis request on stdin"),
    }
  } else {
    request_from_paths(&paths, &types, &config)?
  };

  if force {
    request.options.force_refresh = true;
  }

  let engine = build_engine(config)?;
  let result = engine.analyze(&request).await?;
  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;

  #[test]
  fn test_request_from_paths_uses_configured_types() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "print('hi')").unwrap();
    let paths = vec![file.path().to_path_buf()];

    let config = Config::default();
    let request = request_from_paths(&paths, &[], &config).unwrap();

    assert_eq!(request.files.len(), 1);
    assert_eq!(request.files[0].content, "print('hi')\n");
    assert_eq!(
      request.analysis_types.iter().copied().collect::<Vec<_>>(),
      vec![AnalysisType::Quality, AnalysisType::Security]
    );

    let request = request_from_paths(&paths, &[AnalysisType::Style], &config).unwrap();
    assert_eq!(request.analysis_types.len(), 1);
  }

  #[test]
  fn test_missing_file_is_an_error() {
    let err = request_from_paths(&[PathBuf::from("/nonexistent/hookwise.rs")], &[], &Config::default()).unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
  }
}
