use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

const DEFAULT_LIMIT: usize = 100;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by user and endpoint.
///
/// Each key holds the timestamps of requests inside the current window;
/// stale timestamps are purged on every check, so after a purge the window
/// never contains entries older than `now - window`. Keys lock individually,
/// so concurrent callers on different keys never contend and concurrent
/// callers on the same key see a consistent window.
pub struct RateLimiter {
    windows: DashMap<String, Vec<Instant>>,
    limit: AtomicUsize,
    window_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            limit: AtomicUsize::new(DEFAULT_LIMIT),
            window_ms: AtomicU64::new(DEFAULT_WINDOW.as_millis() as u64),
        }
    }

    /// Admits the request iff the key has fewer than `limit` requests inside
    /// the current window; an admitted request is recorded immediately.
    pub fn allow(&self, user_id: &str, endpoint: &str) -> bool {
        let limit = self.limit.load(Ordering::Relaxed);
        let window = self.window();
        let now = Instant::now();

        let mut entry = self.windows.entry(key(user_id, endpoint)).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= limit {
            return false;
        }

        entry.push(now);
        true
    }

    /// Requests still available for the key inside the current window.
    /// A query never creates tracking state for an unseen key.
    pub fn remaining(&self, user_id: &str, endpoint: &str) -> usize {
        let limit = self.limit.load(Ordering::Relaxed);
        let window = self.window();
        let now = Instant::now();

        match self.windows.get_mut(&key(user_id, endpoint)) {
            Some(mut entry) => {
                entry.retain(|t| now.duration_since(*t) < window);
                limit.saturating_sub(entry.len())
            }
            None => limit,
        }
    }

    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
    }

    pub fn set_window(&self, window: Duration) {
        self.window_ms
            .store(window.as_millis() as u64, Ordering::Relaxed);
    }

    /// Clears every tracked window.
    pub fn reset(&self) {
        self.windows.clear();
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.load(Ordering::Relaxed))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn key(user_id: &str, endpoint: &str) -> String {
    format!("{user_id}:{endpoint}")
}
