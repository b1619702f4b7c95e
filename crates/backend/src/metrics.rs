//! In-process operation counters.
//!
//! Counters and duration accumulators are keyed by `(name, label)`, where the
//! label is usually a hook type or analysis type.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

type MetricKey = (String, String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
  pub count: u64,
  pub total_ms: u64,
  pub max_ms: u64,
}

impl DurationSummary {
  pub fn mean_ms(&self) -> u64 {
    self.total_ms.checked_div(self.count).unwrap_or(0)
  }
}

/// Point-in-time copy of all metrics, keyed as `name{label}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
  pub taken_at: DateTime<Utc>,
  pub counters: BTreeMap<String, u64>,
  pub durations: BTreeMap<String, DurationSummary>,
}

#[derive(Debug, Default)]
pub struct Metrics {
  counters: DashMap<MetricKey, u64>,
  durations: DashMap<MetricKey, DurationSummary>,
}

impl Metrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn increment(&self, name: &str, label: &str, by: u64) {
    *self.counters.entry((name.to_string(), label.to_string())).or_insert(0) += by;
  }

  pub fn record_duration(&self, name: &str, label: &str, duration: Duration) {
    let ms = duration.as_millis() as u64;
    let mut summary = self.durations.entry((name.to_string(), label.to_string())).or_default();
    summary.count += 1;
    summary.total_ms += ms;
    summary.max_ms = summary.max_ms.max(ms);
  }

  pub fn counter(&self, name: &str, label: &str) -> u64 {
    self
      .counters
      .get(&(name.to_string(), label.to_string()))
      .map_or(0, |v| *v)
  }

  pub fn duration(&self, name: &str, label: &str) -> DurationSummary {
    self
      .durations
      .get(&(name.to_string(), label.to_string()))
      .map_or_else(DurationSummary::default, |v| *v)
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    let format_key = |(name, label): &MetricKey| format!("{}{{{}}}", name, label);
    MetricsSnapshot {
      taken_at: Utc::now(),
      counters: self.counters.iter().map(|e| (format_key(e.key()), *e.value())).collect(),
      durations: self.durations.iter().map(|e| (format_key(e.key()), *e.value())).collect(),
    }
  }
}
