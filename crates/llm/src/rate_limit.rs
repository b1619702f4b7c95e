// Dual-budget sliding window rate limiter for the analysis service
//
// Tracks both the number of requests and their estimated cost (tokens) over a
// configurable window. A request proceeds only when both budgets have room.
//
// Waiters are admitted strictly in arrival order: the async wrapper serializes
// them behind a fair mutex, so a cheap request never overtakes an expensive one
// that arrived first.
//
// The limiter supports a token-based refund mechanism for failed requests
// that never reached the provider (spawn failures, network errors).

use std::{collections::VecDeque, time::Duration};

use hookwise_core::RateLimitSettings;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, trace, warn};

/// Token returned when recording a request, used for potential refunds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetToken {
  timestamp: Instant,
  /// Unique identifier to distinguish tokens with same timestamp
  id: u64,
}

impl BudgetToken {
  fn new(timestamp: Instant, id: u64) -> Self {
    Self { timestamp, id }
  }
}

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
  /// Maximum requests allowed in the window
  pub max_requests: usize,
  /// Maximum estimated cost (tokens) allowed in the window
  pub max_cost: u64,
  /// Time window duration
  pub window: Duration,
  /// Maximum time to wait for budget before failing
  pub max_wait: Duration,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self::from(&RateLimitSettings::default())
  }
}

impl From<&RateLimitSettings> for RateLimitConfig {
  fn from(settings: &RateLimitSettings) -> Self {
    Self {
      max_requests: settings.max_requests,
      max_cost: settings.max_cost,
      window: Duration::from_secs(settings.window_secs),
      max_wait: Duration::from_secs(settings.max_wait_secs),
    }
  }
}

impl RateLimitConfig {
  pub fn new(max_requests: usize, max_cost: u64, window: Duration) -> Self {
    Self {
      max_requests,
      max_cost,
      window,
      max_wait: Duration::from_secs(30),
    }
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BudgetError {
  /// Budget did not free up within `max_wait`; retryable
  #[error("rate limit budget exceeded, waited {waited:?}")]
  Exceeded { waited: Duration },
  /// A single request costs more than the whole window allows; never retryable
  #[error("request cost {cost} exceeds the per-window budget of {max_cost}")]
  TooLarge { cost: u64, max_cost: u64 },
}

/// Sliding window limiter over request count and cost, with refund support.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
  config: RateLimitConfig,
  /// Request records (timestamp, token_id, cost) within the window
  request_records: VecDeque<(Instant, u64, u64)>,
  /// Sum of the costs in `request_records`
  cost_in_window: u64,
  /// Counter for generating unique token IDs
  next_token_id: u64,
}

impl SlidingWindowLimiter {
  pub fn new(config: RateLimitConfig) -> Self {
    let capacity = config.max_requests + 1;
    Self {
      config,
      request_records: VecDeque::with_capacity(capacity),
      cost_in_window: 0,
      next_token_id: 0,
    }
  }

  /// Remove expired records from the window
  fn prune_expired(&mut self) {
    let now = Instant::now();
    let before_count = self.request_records.len();
    while let Some(&(oldest_ts, _, cost)) = self.request_records.front() {
      if oldest_ts + self.config.window <= now {
        self.request_records.pop_front();
        self.cost_in_window -= cost;
      } else {
        break;
      }
    }
    let pruned = before_count - self.request_records.len();
    if pruned > 0 {
      trace!(
        pruned = pruned,
        remaining = self.request_records.len(),
        cost_in_window = self.cost_in_window,
        "Rate limit window advanced, pruned expired records"
      );
    }
  }

  /// Check if a request of `cost` can go now, and if not, how long to wait
  fn check_and_wait_time(&mut self, cost: u64) -> Option<Duration> {
    self.prune_expired();

    let now = Instant::now();
    let mut wait = Duration::ZERO;

    // Count budget: wait for the oldest record(s) to leave the window
    if self.request_records.len() >= self.config.max_requests {
      let must_expire = self.request_records.len() + 1 - self.config.max_requests;
      if let Some(&(ts, _, _)) = self.request_records.get(must_expire - 1) {
        wait = wait.max((ts + self.config.window).saturating_duration_since(now));
      }
    }

    // Cost budget: wait until enough cost has expired to fit this request
    if self.cost_in_window + cost > self.config.max_cost {
      let mut freed = 0u64;
      for &(ts, _, record_cost) in &self.request_records {
        freed += record_cost;
        if self.cost_in_window - freed + cost <= self.config.max_cost {
          wait = wait.max((ts + self.config.window).saturating_duration_since(now));
          break;
        }
      }
    }

    if wait.is_zero() { None } else { Some(wait) }
  }

  /// Record a request and return a token that can be used to refund the slot.
  pub fn record_request_with_token(&mut self, cost: u64) -> BudgetToken {
    let ts = Instant::now();
    let id = self.next_token_id;
    self.next_token_id = self.next_token_id.wrapping_add(1);
    self.request_records.push_back((ts, id, cost));
    self.cost_in_window += cost;
    BudgetToken::new(ts, id)
  }

  /// Refund a slot using the token from `record_request_with_token`.
  ///
  /// Call this when a request fails before reaching the provider (spawn
  /// failure, network error). Do NOT refund for rate-limit responses or
  /// anything the provider processed.
  ///
  /// Returns true if the token was found and removed, false otherwise.
  pub fn refund(&mut self, token: BudgetToken) -> bool {
    if let Some(pos) = self
      .request_records
      .iter()
      .position(|&(ts, id, _)| ts == token.timestamp && id == token.id)
    {
      if let Some((_, _, cost)) = self.request_records.remove(pos) {
        self.cost_in_window -= cost;
      }
      trace!(
        token_id = token.id,
        remaining = self.request_records.len(),
        "Rate limit slot refunded"
      );
      true
    } else {
      // Token may have already expired and been pruned, that's fine
      trace!(
        token_id = token.id,
        "Rate limit refund: token not found (may have expired)"
      );
      false
    }
  }

  /// Check if budget is available and record with token if so.
  /// Returns Ok(token) if budget was acquired, or Err(wait_time) if we need to wait.
  pub fn check_and_record_with_token(&mut self, cost: u64) -> Result<BudgetToken, Duration> {
    match self.check_and_wait_time(cost) {
      None => Ok(self.record_request_with_token(cost)),
      Some(duration) => Err(duration),
    }
  }

  pub fn config(&self) -> &RateLimitConfig {
    &self.config
  }
}

/// Async, FIFO-fair front for a [`SlidingWindowLimiter`] shared by all callers.
#[derive(Debug)]
pub struct RateLimiter {
  limiter: Mutex<SlidingWindowLimiter>,
  /// Held by the caller at the head of the queue while it waits for budget
  queue: Mutex<()>,
  max_cost: u64,
  max_wait: Duration,
}

impl RateLimiter {
  pub fn new(config: RateLimitConfig) -> Self {
    Self {
      max_cost: config.max_cost,
      max_wait: config.max_wait,
      limiter: Mutex::new(SlidingWindowLimiter::new(config)),
      queue: Mutex::new(()),
    }
  }

  /// Wait for budget for one request of `cost`.
  ///
  /// Callers are served in arrival order. Fails with [`BudgetError::Exceeded`]
  /// once the wait would pass `max_wait`.
  pub async fn acquire(&self, cost: u64) -> Result<BudgetToken, BudgetError> {
    if cost > self.max_cost {
      return Err(BudgetError::TooLarge {
        cost,
        max_cost: self.max_cost,
      });
    }

    let start = Instant::now();
    let _turn = self.queue.lock().await;

    loop {
      let result = {
        let mut limiter = self.limiter.lock().await;
        limiter.check_and_record_with_token(cost)
      };

      match result {
        Ok(token) => {
          trace!(elapsed_ms = start.elapsed().as_millis(), cost, "Rate limit budget acquired");
          return Ok(token);
        }
        Err(wait) => {
          if start.elapsed() + wait > self.max_wait {
            warn!(
              max_wait_ms = self.max_wait.as_millis(),
              elapsed_ms = start.elapsed().as_millis(),
              cost,
              "Rate limiter max wait time exceeded"
            );
            return Err(BudgetError::Exceeded {
              waited: start.elapsed(),
            });
          }

          debug!(wait_ms = wait.as_millis(), cost, "Rate limiter waiting for budget");
          tokio::time::sleep(wait).await;
        }
      }
    }
  }

  pub async fn refund(&self, token: BudgetToken) -> bool {
    self.limiter.lock().await.refund(token)
  }
}
