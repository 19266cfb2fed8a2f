//! Fixed-window rate limiting
//!
//! Counters are process-local and reset on restart. A multi-instance
//! deployment would provide its own [`RateLimitStore`].

use axum::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request fits in the current window
    pub allowed: bool,
    /// Ceiling per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// End of the current window
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never less than 1
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Request counter store keyed by client
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count a request for `key` at `now` and decide whether it is allowed
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision;
}

#[derive(Debug, Clone)]
struct WindowEntry {
    /// Requests counted in this window
    count: u32,
    window_start: DateTime<Utc>,
}

impl WindowEntry {
    fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.window_start + window
    }
}

/// In-memory fixed-window limiter
///
/// A window opens with a client's first request and lasts `window`.
/// Memory is bounded by `max_tracked_keys`; when full, expired windows are
/// pruned first and then the oldest window is evicted.
pub struct FixedWindowLimiter {
    entries: RwLock<HashMap<String, WindowEntry>>,
    max_requests: u32,
    window: Duration,
    max_tracked_keys: usize,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window_seconds: u64, max_tracked_keys: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_requests: max_requests.max(1),
            window: Duration::seconds(window_seconds.max(1) as i64),
            max_tracked_keys: max_tracked_keys.max(1),
        }
    }

    fn prune_expired_locked(
        entries: &mut HashMap<String, WindowEntry>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, window));
        before - entries.len()
    }

    fn evict_oldest_locked(entries: &mut HashMap<String, WindowEntry>) -> bool {
        let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.window_start)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        entries.remove(&oldest_key);
        true
    }

    /// Number of clients currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl RateLimitStore for FixedWindowLimiter {
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_tracked_keys {
            let pruned = Self::prune_expired_locked(&mut entries, now, self.window);
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned expired rate limit windows");
            }
            if entries.len() >= self.max_tracked_keys {
                let _ = Self::evict_oldest_locked(&mut entries);
            }
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            window_start: now,
        });

        if entry.is_expired(now, self.window) {
            entry.count = 0;
            entry.window_start = now;
        }

        let reset_at = entry.window_start + self.window;

        if entry.count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_at,
        }
    }
}
