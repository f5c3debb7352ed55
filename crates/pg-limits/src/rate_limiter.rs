//! `RateLimiter` — fixed 60-second window, keyed by an opaque counter name.
//! Callers compose counter names themselves: a bare api-key for
//! the per-key limit, `"<key>:tool:<name>"` for the per-key-per-tool limit.

use dashmap::DashMap;

const WINDOW_MS: i64 = 60_000;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub used: u64,
    pub limit: u64,
    /// `u64::MAX` stands in for "+infinity" when `limit == 0`.
    pub remaining: u64,
    pub reset_in_ms: i64,
}

pub struct RateLimiter {
    counters: DashMap<String, Vec<i64>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    fn in_window(timestamps: &[i64], now: i64) -> u64 {
        timestamps.iter().filter(|&&t| now - t <= WINDOW_MS).count() as u64
    }

    /// Current count in the window. Never mutates state.
    pub fn check(&self, ctr: &str) -> u64 {
        let now = now_millis();
        match self.counters.get(ctr) {
            Some(entry) => Self::in_window(entry.value(), now),
            None => 0,
        }
    }

    /// `limit == 0` means unbounded.
    pub fn is_allowed(&self, ctr: &str, limit: u64) -> bool {
        limit == 0 || self.check(ctr) < limit
    }

    /// Increments and records a timestamp, pruning stale entries first.
    /// Returns the post-increment count.
    pub fn record(&self, ctr: &str) -> u64 {
        let now = now_millis();
        let mut entry = self.counters.entry(ctr.to_string()).or_default();
        entry.retain(|&t| now - t <= WINDOW_MS);
        entry.push(now);
        entry.len() as u64
    }

    /// Read-only status snapshot; must not record.
    pub fn get_status(&self, ctr: &str, limit: u64) -> RateLimitStatus {
        let now = now_millis();
        let (used, oldest) = match self.counters.get(ctr) {
            Some(entry) => {
                let in_window: Vec<i64> = entry
                    .value()
                    .iter()
                    .copied()
                    .filter(|&t| now - t <= WINDOW_MS)
                    .collect();
                let oldest = in_window.iter().min().copied();
                (in_window.len() as u64, oldest)
            }
            None => (0, None),
        };

        let remaining = if limit == 0 {
            u64::MAX
        } else {
            limit.saturating_sub(used)
        };

        let reset_in_ms = match oldest {
            Some(t) => (WINDOW_MS - (now - t)).max(0),
            None => 0,
        };

        RateLimitStatus {
            used,
            limit,
            remaining,
            reset_in_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counter_allows_first_call() {
        let limiter = RateLimiter::new();
        assert!(limiter.is_allowed("k1", 5));
        assert_eq!(limiter.check("k1"), 0);
    }

    #[test]
    fn limit_is_enforced_after_recording() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.record("k1");
        }
        assert!(!limiter.is_allowed("k1", 5));
        assert!(limiter.is_allowed("k1", 6));
    }

    #[test]
    fn zero_limit_means_unbounded() {
        let limiter = RateLimiter::new();
        for _ in 0..1000 {
            limiter.record("k1");
        }
        assert!(limiter.is_allowed("k1", 0));
    }

    #[test]
    fn get_status_does_not_record() {
        let limiter = RateLimiter::new();
        limiter.record("k1");
        let before = limiter.check("k1");
        let status = limiter.get_status("k1", 10);
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining, 9);
        assert_eq!(limiter.check("k1"), before);
    }

    #[test]
    fn per_tool_composite_counters_are_independent() {
        let limiter = RateLimiter::new();
        limiter.record("pg_k1");
        limiter.record("pg_k1:tool:search");
        assert_eq!(limiter.check("pg_k1"), 1);
        assert_eq!(limiter.check("pg_k1:tool:search"), 1);
    }
}
