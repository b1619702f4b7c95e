//! Shared cache tier.
//!
//! The shared tier is the source of truth across instances and holds the
//! authoritative tag index. [`SharedStore`] is the seam for a networked store; the
//! in-process [`MemorySharedStore`] backs tests and single-host deployments.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{sync::broadcast, time::Instant};
use tracing::trace;

use super::expiry_from;

/// Capacity of the invalidation broadcast; slower listeners see `Lagged`.
const INVALIDATION_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("shared store unavailable: {0}")]
  Unavailable(String),
}

/// A value read back from the shared tier with the TTL it has left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
  pub bytes: Vec<u8>,
  pub ttl_remaining: Duration,
}

/// Key/value store with TTLs and a tag index, shared by every cache instance.
///
/// Writing a key and adding its tag memberships are separate calls; callers
/// must tolerate a tag set that names keys which no longer exist.
#[async_trait]
pub trait SharedStore: Send + Sync {
  fn name(&self) -> &str;

  async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

  async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

  /// Returns whether the key existed.
  async fn delete(&self, key: &str) -> Result<bool, StoreError>;

  async fn tag_add(&self, tag: &str, key: &str) -> Result<(), StoreError>;

  /// Live members of a tag. Members whose key has expired or been deleted are
  /// pruned from the tag as a side effect.
  async fn tag_members(&self, tag: &str) -> Result<Vec<String>, StoreError>;

  async fn tag_remove(&self, tag: &str) -> Result<(), StoreError>;

  async fn clear(&self) -> Result<(), StoreError>;

  async fn len(&self) -> Result<usize, StoreError>;

  /// Keys deleted from this store, for instances that keep a local tier in
  /// front of it. `None` if the store cannot publish invalidations.
  fn subscribe_invalidations(&self) -> Option<broadcast::Receiver<String>> {
    None
  }
}

/// In-process shared tier.
pub struct MemorySharedStore {
  entries: DashMap<String, (Vec<u8>, Instant)>,
  tags: DashMap<String, HashSet<String>>,
  invalidations: broadcast::Sender<String>,
}

impl MemorySharedStore {
  pub fn new() -> Self {
    let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
    Self {
      entries: DashMap::new(),
      tags: DashMap::new(),
      invalidations,
    }
  }

  fn is_live(&self, key: &str, now: Instant) -> bool {
    self.entries.get(key).is_some_and(|entry| entry.1 > now)
  }

  fn publish(&self, key: &str) {
    // No subscribers is fine
    let _ = self.invalidations.send(key.to_string());
  }
}

impl Default for MemorySharedStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl SharedStore for MemorySharedStore {
  fn name(&self) -> &str {
    "memory"
  }

  async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
    let now = Instant::now();
    let expired = match self.entries.get(key) {
      Some(entry) if entry.1 > now => {
        return Ok(Some(StoredValue {
          bytes: entry.0.clone(),
          ttl_remaining: entry.1 - now,
        }));
      }
      Some(_) => true,
      None => false,
    };

    if expired {
      self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
      trace!(key, "Dropped expired shared entry");
    }
    Ok(None)
  }

  async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
    self.entries.insert(key.to_string(), (bytes, expiry_from(Instant::now(), ttl)));
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<bool, StoreError> {
    let existed = self.entries.remove(key).is_some();
    if existed {
      self.publish(key);
    }
    Ok(existed)
  }

  async fn tag_add(&self, tag: &str, key: &str) -> Result<(), StoreError> {
    self.tags.entry(tag.to_string()).or_default().insert(key.to_string());
    Ok(())
  }

  async fn tag_members(&self, tag: &str) -> Result<Vec<String>, StoreError> {
    let now = Instant::now();
    let Some(members) = self.tags.get(tag).map(|set| set.clone()) else {
      return Ok(Vec::new());
    };

    let (live, stale): (Vec<String>, Vec<String>) = members.into_iter().partition(|key| self.is_live(key, now));

    if !stale.is_empty() {
      trace!(tag, pruned = stale.len(), "Pruning stale tag members");
      if let Some(mut set) = self.tags.get_mut(tag) {
        for key in &stale {
          set.remove(key);
        }
      }
      self.tags.remove_if(tag, |_, set| set.is_empty());
    }

    Ok(live)
  }

  async fn tag_remove(&self, tag: &str) -> Result<(), StoreError> {
    self.tags.remove(tag);
    Ok(())
  }

  async fn clear(&self) -> Result<(), StoreError> {
    let keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
    self.entries.clear();
    self.tags.clear();
    for key in &keys {
      self.publish(key);
    }
    Ok(())
  }

  async fn len(&self) -> Result<usize, StoreError> {
    let now = Instant::now();
    Ok(self.entries.iter().filter(|entry| entry.value().1 > now).count())
  }

  fn subscribe_invalidations(&self) -> Option<broadcast::Receiver<String>> {
    Some(self.invalidations.subscribe())
  }
}
