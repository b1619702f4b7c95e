//! In-process cache tier.
//!
//! Bounded both by entry count and by bytes: every entry weighs at least
//! `max_bytes / max_entries`, so filling the byte budget with tiny entries
//! also caps their number. Eviction is least-recently-used.

use std::{sync::Arc, time::Duration};

use moka::{Expiry, policy::EvictionPolicy, sync::Cache};
use tokio::time::Instant;

use super::{MAX_TTL, expiry_from};

#[derive(Debug, Clone)]
pub struct LocalEntry {
  pub bytes: Arc<Vec<u8>>,
  pub tags: Arc<[String]>,
  ttl: Duration,
  expires_at: Instant,
}

impl LocalEntry {
  fn new(bytes: Vec<u8>, tags: &[String], ttl: Duration) -> Self {
    let ttl = ttl.min(MAX_TTL);
    Self {
      bytes: Arc::new(bytes),
      tags: tags.into(),
      ttl,
      expires_at: expiry_from(Instant::now(), ttl),
    }
  }

  fn is_expired(&self, now: Instant) -> bool {
    now >= self.expires_at
  }
}

/// Evicts entries on moka's own clock; [`LocalCache::get`] also checks
/// `expires_at` so a stale entry is never returned in between.
struct EntryExpiry;

impl Expiry<String, LocalEntry> for EntryExpiry {
  fn expire_after_create(&self, _key: &String, value: &LocalEntry, _created_at: std::time::Instant) -> Option<Duration> {
    Some(value.ttl)
  }

  fn expire_after_update(
    &self,
    _key: &String,
    value: &LocalEntry,
    _updated_at: std::time::Instant,
    _duration_until_expiry: Option<Duration>,
  ) -> Option<Duration> {
    Some(value.ttl)
  }
}

/// LRU cache of serialized values with per-entry TTL.
#[derive(Clone)]
pub struct LocalCache {
  cache: Cache<String, LocalEntry>,
}

impl LocalCache {
  pub fn new(max_entries: u64, max_bytes: u64) -> Self {
    let min_weight = (max_bytes / max_entries.max(1)).max(1);
    Self {
      cache: Cache::builder()
        .max_capacity(max_bytes)
        .weigher(move |_key: &String, value: &LocalEntry| -> u32 {
          (value.bytes.len() as u64).max(min_weight).min(u32::MAX as u64) as u32
        })
        .expire_after(EntryExpiry)
        .eviction_policy(EvictionPolicy::lru())
        .build(),
    }
  }

  pub fn get(&self, key: &str) -> Option<LocalEntry> {
    let entry = self.cache.get(key)?;
    if entry.is_expired(Instant::now()) {
      self.cache.invalidate(key);
      return None;
    }
    Some(entry)
  }

  pub fn insert(&self, key: &str, bytes: Vec<u8>, tags: &[String], ttl: Duration) {
    self.cache.insert(key.to_string(), LocalEntry::new(bytes, tags, ttl));
  }

  pub fn remove(&self, key: &str) {
    self.cache.invalidate(key);
  }

  /// Keys of live entries written with `tag`.
  pub fn keys_tagged(&self, tag: &str) -> Vec<String> {
    let now = Instant::now();
    self
      .cache
      .iter()
      .filter(|(_, entry)| !entry.is_expired(now) && entry.tags.iter().any(|t| t == tag))
      .map(|(key, _)| key.as_ref().clone())
      .collect()
  }

  pub fn clear(&self) {
    self.cache.invalidate_all();
  }

  pub fn entry_count(&self) -> u64 {
    self.cache.entry_count()
  }

  pub fn weighted_size(&self) -> u64 {
    self.cache.weighted_size()
  }

  /// Apply pending evictions so counts are exact.
  pub fn sync(&self) {
    self.cache.run_pending_tasks();
  }
}
