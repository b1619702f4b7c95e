//! Two-tier cache with TTLs and tag-based invalidation.
//!
//! Reads go local, then shared; a shared hit repopulates the local tier with
//! the TTL the entry has left. Writes go to both tiers with the same TTL. The
//! authoritative tag index lives in the shared tier; local entries remember
//! the tags they were written with.
//!
//! When the shared tier fails, the service logs one warning, marks itself
//! degraded and keeps serving from the local tier.
//!
//! ## Invalidation across instances
//!
//! `delete_by_tags` purges the removed keys from the calling instance's local
//! tier. Other instances only learn about it through
//! [`CacheService::spawn_invalidation_listener`]; without a listener their
//! local copies live until their TTL runs out.

mod local;
mod shared;

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  time::Duration,
};

use hookwise_core::CacheConfig;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
  sync::broadcast::error::RecvError,
  task::JoinHandle,
  time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub use local::LocalCache;
pub use shared::{MemorySharedStore, SharedStore, StoreError, StoredValue};

/// Longest TTL either tier will hold an entry for; longer requests are
/// clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deadline `ttl` from `now`, never past [`MAX_TTL`].
pub(crate) fn expiry_from(now: Instant, ttl: Duration) -> Instant {
  now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cache unavailable: {0}")]
  Unavailable(#[from] StoreError),
  #[error("failed to serialize cache value: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Per-write options.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
  /// Falls back to the configured default TTL
  pub ttl: Option<Duration>,
  pub tags: Vec<String>,
}

impl SetOptions {
  pub fn ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  pub fn tag(mut self, tag: impl Into<String>) -> Self {
    self.tags.push(tag.into());
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub local_entries: u64,
  pub local_bytes: u64,
  /// `None` without a shared tier or while it is failing
  pub shared_entries: Option<usize>,
  pub local_hits: u64,
  pub shared_hits: u64,
  pub misses: u64,
  pub writes: u64,
  pub tag_invalidations: u64,
  pub degraded: bool,
}

#[derive(Debug, Default)]
struct Counters {
  local_hits: AtomicU64,
  shared_hits: AtomicU64,
  misses: AtomicU64,
  writes: AtomicU64,
  tag_invalidations: AtomicU64,
}

pub struct CacheService {
  local: LocalCache,
  shared: Option<Arc<dyn SharedStore>>,
  default_ttl: Duration,
  degraded: AtomicBool,
  counters: Counters,
}

impl CacheService {
  pub fn new(config: &CacheConfig, shared: Option<Arc<dyn SharedStore>>) -> Self {
    Self {
      local: LocalCache::new(config.local_max_entries, config.local_max_bytes),
      shared,
      default_ttl: config.default_ttl(),
      degraded: AtomicBool::new(false),
      counters: Counters::default(),
    }
  }

  pub fn local_only(config: &CacheConfig) -> Self {
    Self::new(config, None)
  }

  pub fn default_ttl(&self) -> Duration {
    self.default_ttl
  }

  pub fn is_degraded(&self) -> bool {
    self.degraded.load(Ordering::Relaxed)
  }

  /// Clear the degraded flag after a shared tier call went through.
  fn shared_succeeded(&self) {
    if self.degraded.swap(false, Ordering::Relaxed) {
      info!("Shared cache tier reachable again");
    }
  }

  /// Record a shared tier failure; only the first one is logged as a warning.
  fn shared_failed(&self, op: &str, err: &StoreError) {
    if !self.degraded.swap(true, Ordering::Relaxed) {
      warn!(op, err = %err, "Shared cache tier unavailable, continuing with local tier only");
    } else {
      debug!(op, err = %err, "Shared cache tier still unavailable");
    }
  }

  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    if let Some(entry) = self.local.get(key) {
      match serde_json::from_slice(&entry.bytes) {
        Ok(value) => {
          self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
          trace!(key, "Local cache hit");
          return Some(value);
        }
        Err(e) => {
          warn!(key, err = %e, "Dropping undecodable local cache entry");
          self.local.remove(key);
        }
      }
    }

    if let Some(shared) = &self.shared {
      let found = shared.get(key).await;
      if found.is_ok() {
        self.shared_succeeded();
      }
      match found {
        Ok(Some(stored)) => match serde_json::from_slice(&stored.bytes) {
          Ok(value) => {
            self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, ttl_remaining_ms = stored.ttl_remaining.as_millis() as u64, "Shared cache hit");
            self.local.insert(key, stored.bytes, &[], stored.ttl_remaining);
            return Some(value);
          }
          Err(e) => warn!(key, err = %e, "Ignoring undecodable shared cache entry"),
        },
        Ok(None) => {}
        Err(e) => self.shared_failed("get", &e),
      }
    }

    self.counters.misses.fetch_add(1, Ordering::Relaxed);
    trace!(key, "Cache miss");
    None
  }

  /// Write to both tiers. The key is written before its tag memberships; a
  /// tag invalidation racing in between can miss the key, which then lives
  /// until its TTL.
  pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec(value)?;
    let requested = options.ttl.unwrap_or(self.default_ttl);
    let ttl = requested.min(MAX_TTL);
    if ttl < requested {
      debug!(key, requested_secs = requested.as_secs(), "Clamping cache TTL");
    }

    self.local.insert(key, bytes.clone(), &options.tags, ttl);
    self.counters.writes.fetch_add(1, Ordering::Relaxed);

    if let Some(shared) = &self.shared {
      let written = async {
        shared.set(key, bytes, ttl).await?;
        for tag in &options.tags {
          shared.tag_add(tag, key).await?;
        }
        Ok::<_, StoreError>(())
      }
      .await;

      match written {
        Ok(()) => self.shared_succeeded(),
        Err(e) => self.shared_failed("set", &e),
      }
    }

    debug!(key, ttl_secs = ttl.as_secs(), tags = options.tags.len(), "Cache entry written");
    Ok(())
  }

  /// Returns whether the key was present in either tier.
  pub async fn delete(&self, key: &str) -> bool {
    let local = self.local.get(key).is_some();
    self.local.remove(key);

    let shared = match &self.shared {
      Some(shared) => match shared.delete(key).await {
        Ok(existed) => {
          self.shared_succeeded();
          existed
        }
        Err(e) => {
          self.shared_failed("delete", &e);
          false
        }
      },
      None => false,
    };

    local || shared
  }

  /// Delete every key written with any of `tags`. Returns the number of keys
  /// removed from the shared tier, or from the local tier when there is no
  /// usable shared tier.
  pub async fn delete_by_tags(&self, tags: &[String]) -> usize {
    let mut removed: HashSet<String> = HashSet::new();
    let mut shared_ok = false;

    if let Some(shared) = &self.shared {
      let result = async {
        for tag in tags {
          for key in shared.tag_members(tag).await? {
            if shared.delete(&key).await? {
              removed.insert(key);
            }
          }
          shared.tag_remove(tag).await?;
        }
        Ok::<_, StoreError>(())
      }
      .await;

      match result {
        Ok(()) => {
          self.shared_succeeded();
          shared_ok = true;
        }
        Err(e) => self.shared_failed("delete_by_tags", &e),
      }
    }

    for key in &removed {
      self.local.remove(key);
    }

    // Entries this instance wrote itself carry their tags locally too
    for tag in tags {
      for key in self.local.keys_tagged(tag) {
        self.local.remove(&key);
        if !shared_ok {
          removed.insert(key);
        }
      }
    }

    let count = removed.len();
    self.counters.tag_invalidations.fetch_add(count as u64, Ordering::Relaxed);
    info!(tags = ?tags, removed = count, "Invalidated cache entries by tag");
    count
  }

  pub async fn clear(&self) {
    self.local.clear();
    if let Some(shared) = &self.shared {
      match shared.clear().await {
        Ok(()) => self.shared_succeeded(),
        Err(e) => self.shared_failed("clear", &e),
      }
    }
    debug!("Cache cleared");
  }

  pub async fn stats(&self) -> CacheStats {
    self.local.sync();

    let shared_entries = match &self.shared {
      Some(shared) => match shared.len().await {
        Ok(len) => {
          self.shared_succeeded();
          Some(len)
        }
        Err(e) => {
          self.shared_failed("len", &e);
          None
        }
      },
      None => None,
    };

    CacheStats {
      local_entries: self.local.entry_count(),
      local_bytes: self.local.weighted_size(),
      shared_entries,
      local_hits: self.counters.local_hits.load(Ordering::Relaxed),
      shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
      misses: self.counters.misses.load(Ordering::Relaxed),
      writes: self.counters.writes.load(Ordering::Relaxed),
      tag_invalidations: self.counters.tag_invalidations.load(Ordering::Relaxed),
      degraded: self.is_degraded(),
    }
  }

  /// Evict keys from the local tier as the shared tier reports them deleted.
  ///
  /// Returns `None` when there is no shared tier or it cannot publish
  /// invalidations. The task runs until `cancel` fires or the store closes
  /// the channel.
  pub fn spawn_invalidation_listener(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
    let mut rx = self.shared.as_ref()?.subscribe_invalidations()?;
    let local = self.local.clone();

    Some(tokio::spawn(async move {
      debug!("Cache invalidation listener started");
      loop {
        tokio::select! {
          _ = cancel.cancelled() => break,
          msg = rx.recv() => match msg {
            Ok(key) => {
              trace!(key = %key, "Evicting invalidated key from local tier");
              local.remove(&key);
            }
            Err(RecvError::Lagged(skipped)) => {
              warn!(skipped, "Invalidation listener lagged, clearing local tier");
              local.clear();
            }
            Err(RecvError::Closed) => break,
          },
        }
      }
      debug!("Cache invalidation listener stopped");
    }))
  }
}
