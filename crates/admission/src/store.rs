//! Counter stores: shared sliding-window state.
//!
//! Each store keeps a log of admission timestamps per key. A check prunes
//! hits older than the window, counts what's left and records a new hit
//! only when the count is below the limit. Prune, count and record happen
//! atomically with respect to other checks on the same store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Window state after one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Whether this check was recorded as a hit.
    pub admitted: bool,
    /// Hits in the trailing window, including this one if admitted.
    pub count: u32,
    /// Earliest hit still in the window.
    pub oldest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store query failed: {0}")]
    Query(String),
}

/// Atomic check-and-record over a sliding-window log.
#[async_trait]
pub trait CounterStore: Send + Sync {
    fn name(&self) -> &str;

    /// Prune hits at or before `now - window`, then record a hit at `now`
    /// if fewer than `limit` remain.
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<WindowSnapshot, StoreError>;

    /// Drop every hit at or before `now - max_window`. Returns rows removed.
    async fn purge(&self, _now: DateTime<Utc>, _max_window: Duration) -> Result<u64, StoreError> {
        Ok(0)
    }
}

/// Start of the window ending at `now`. Hits at or before this instant
/// have expired.
pub(crate) fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Keys tracked before stale ones are evicted.
const EVICTION_THRESHOLD: usize = 10_000;

/// In-process store. Counters are per process.
pub struct InMemoryCounterStore {
    hits: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn hit(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<WindowSnapshot, StoreError> {
        let cutoff = window_start(now, window);
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());

        // Evict keys whose newest hit has already expired
        if hits.len() > EVICTION_THRESHOLD {
            hits.retain(|_, log| log.back().is_some_and(|t| *t > cutoff));
        }

        let log = hits.entry(key.to_string()).or_default();
        while log.front().is_some_and(|t| *t <= cutoff) {
            log.pop_front();
        }

        let admitted = (log.len() as u64) < u64::from(limit);
        if admitted {
            log.push_back(now);
        }

        Ok(WindowSnapshot {
            admitted,
            count: log.len() as u32,
            oldest: log.front().copied(),
        })
    }

    async fn purge(&self, now: DateTime<Utc>, max_window: Duration) -> Result<u64, StoreError> {
        let cutoff = window_start(now, max_window);
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0u64;
        for log in hits.values_mut() {
            let before = log.len();
            log.retain(|t| *t > cutoff);
            removed += (before - log.len()) as u64;
        }
        hits.retain(|_, log| !log.is_empty());
        Ok(removed)
    }
}
