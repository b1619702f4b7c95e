//! Deterministic cache keys for analysis requests.
//!
//! A key depends only on the request's identifying content:
//! - `(path, sha256(content))` pairs sorted by path then hash
//! - the analysis types, sorted
//! - a SHA-256 of the context map, serialized with object keys sorted at
//!   every nesting level
//!
//! Options (`force_refresh`, TTL, thresholds) are not part of the key.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{analysis::AnalysisRequest, error::Result};

/// Prefix for every analysis cache key.
pub const KEY_PREFIX: &str = "analysis:";

#[derive(Serialize)]
struct Fingerprint<'a> {
  files: Vec<(&'a str, String)>,
  types: Vec<&'static str>,
  context: String,
}

/// Compute the cache key for a request.
pub fn cache_key(request: &AnalysisRequest) -> Result<String> {
  let mut files: Vec<(&str, String)> = request
    .files
    .iter()
    .map(|f| (f.path.as_str(), f.content_hash()))
    .collect();
  files.sort();

  // BTreeSet iteration is already ordered; collect keeps that order
  let types: Vec<&'static str> = request.analysis_types.iter().map(|t| t.as_str()).collect();

  let context = serde_json::Value::Object(request.context.clone().into_iter().collect());
  let context = sha256_hex(&serde_json::to_vec(&canonicalize(&context))?);

  let fingerprint = Fingerprint { files, types, context };
  let bytes = serde_json::to_vec(&fingerprint)?;

  Ok(format!("{}{}", KEY_PREFIX, sha256_hex(&bytes)))
}

/// Rebuild a JSON value with object keys inserted in sorted order.
///
/// Without serde_json's `preserve_order` feature maps are sorted already; this
/// keeps keys stable even if some dependency turns that feature on.
pub fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
  match value {
    serde_json::Value::Object(map) => {
      let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      let mut sorted = serde_json::Map::new();
      for (key, val) in entries {
        sorted.insert(key.clone(), canonicalize(val));
      }
      serde_json::Value::Object(sorted)
    }
    serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(canonicalize).collect()),
    other => other.clone(),
  }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}
