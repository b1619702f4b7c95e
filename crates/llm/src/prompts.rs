//! Analysis prompts
//!
//! Uses a JSON schema for structured output validation. Providers that cannot
//! enforce the schema still get it in the prompt, and the response parser
//! falls back to heuristics when the answer does not match it.

use std::collections::BTreeMap;

use hookwise_core::{AnalysisOptions, AnalysisType, FileInput};
use tracing::trace;

/// JSON schema for a single analysis type's response
pub const ANALYSIS_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "score": { "type": "number", "minimum": 0, "maximum": 10 },
    "issues": {
      "type": "array",
      "items": {
        "type": "object",
        "properties": {
          "severity": { "type": "string", "enum": ["info", "low", "medium", "high", "critical"] },
          "message": { "type": "string" },
          "file": { "type": ["string", "null"] },
          "line": { "type": ["integer", "null"], "minimum": 1 },
          "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
        },
        "required": ["severity", "message"]
      }
    },
    "suggestions": { "type": "array", "items": { "type": "string" } },
    "auto_fixable": {
      "type": "array",
      "items": {
        "type": "object",
        "properties": {
          "file": { "type": "string" },
          "description": { "type": "string" },
          "line": { "type": ["integer", "null"], "minimum": 1 },
          "replacement": { "type": ["string", "null"] }
        },
        "required": ["file", "description"]
      }
    }
  },
  "required": ["score", "issues"]
}"#;

/// System prompt shared by every analysis type
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a code review system invoked from git hooks. Review only the files provided.

Guidelines:
1. Score from 0 (unusable) to 10 (exemplary)
2. Report concrete issues with file and line when known
3. Use "critical" only for problems that must block the change
4. Give each issue a confidence between 0 and 1
5. Respond with JSON matching the schema, nothing else"#;

fn type_instructions(analysis_type: AnalysisType) -> &'static str {
  match analysis_type {
    AnalysisType::Quality => {
      "Assess correctness and maintainability: logic errors, unhandled failure paths, dead code, duplicated logic, unclear naming."
    }
    AnalysisType::Security => {
      "Assess security: injection, hardcoded secrets or credentials, unsafe deserialization, missing input validation, weak cryptography, path traversal."
    }
    AnalysisType::Performance => {
      "Assess performance: needless allocation or copying, quadratic loops over large inputs, blocking calls on async paths, repeated I/O."
    }
    AnalysisType::Style => {
      "Assess style: formatting consistency, idiomatic constructs for the language, naming conventions, import hygiene."
    }
    AnalysisType::Documentation => {
      "Assess documentation: missing docs on public items, stale or misleading comments, undocumented error conditions."
    }
    AnalysisType::Complexity => {
      "Assess complexity: deeply nested control flow, long functions, too many parameters, tangled state."
    }
  }
}

/// Build the prompt for one analysis type. File contents are appended by the
/// caller via [`format_files`].
pub fn build_analysis_prompt(
  analysis_type: AnalysisType,
  options: &AnalysisOptions,
  context: &BTreeMap<String, serde_json::Value>,
) -> String {
  let mut prompt = format!("Analysis type: {}\n{}\n", analysis_type, type_instructions(analysis_type));

  if options.include_fix_suggestions {
    prompt.push_str("\nList mechanical fixes under auto_fixable with the replacement text when it is short.\n");
  } else {
    prompt.push_str("\nLeave auto_fixable empty.\n");
  }

  if options.confidence_threshold > 0.0 {
    prompt.push_str(&format!(
      "Omit issues you are less than {:.0}% confident about.\n",
      options.confidence_threshold * 100.0
    ));
  }

  if !context.is_empty() {
    prompt.push_str("\nContext:");
    for (key, value) in context {
      match value {
        serde_json::Value::String(s) => prompt.push_str(&format!("\n  - {}: {}", key, s)),
        other => prompt.push_str(&format!("\n  - {}: {}", key, other)),
      }
    }
    prompt.push('\n');
  }

  prompt.push_str("\nResponse schema:\n");
  prompt.push_str(ANALYSIS_SCHEMA);
  prompt.push('\n');

  trace!(
    analysis_type = %analysis_type,
    context_keys = context.len(),
    total_len = prompt.len(),
    "Built analysis prompt"
  );
  prompt
}

/// Render files as fenced blocks, truncating each to `max_file_bytes` on a
/// char boundary.
pub fn format_files(files: &[FileInput], max_file_bytes: usize) -> String {
  let mut out = String::from("\nFiles:\n");

  for file in files {
    let content = truncate_at_char_boundary(&file.content, max_file_bytes);
    let truncated = content.len() < file.content.len();

    out.push_str(&format!("\n### {}", file.path));
    if truncated {
      out.push_str(&format!(" (truncated to {} of {} bytes)", content.len(), file.content.len()));
    }
    out.push_str(&format!(
      "\n```{}\n{}\n```\n",
      file.language.as_deref().unwrap_or(""),
      content
    ));
  }

  trace!(file_count = files.len(), total_len = out.len(), "Formatted files for analysis");
  out
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
  if s.len() <= max_bytes {
    return s;
  }
  let mut end = max_bytes;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  &s[..end]
}
