//! Per-key in-flight call counter.
//!
//! Grounded on `runtime::schedule_runner::ConcurrencyGuard` in the
//! teacher's scheduler, which keyed an `RwLock<HashMap<Uuid,
//! Arc<AtomicU32>>>` by schedule id and exposed async `acquire`/`release`
//! guards. `Gate::evaluate` never suspends, so this version keys by api
//! key string and acquires synchronously via a lock-free `DashMap`.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

#[derive(Default)]
pub struct ConcurrencyGuard {
    counts: DashMap<String, AtomicU32>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self { counts: DashMap::new() }
    }

    /// `max == 0` means unlimited. Returns whether a slot was taken.
    pub fn try_acquire(&self, key: &str, max: u32) -> bool {
        if max == 0 {
            return true;
        }
        let counter = self.counts.entry(key.to_string()).or_insert_with(|| AtomicU32::new(0));
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= max {
                return false;
            }
            match counter.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn release(&self, key: &str) {
        if let Some(counter) = self.counts.get(key) {
            let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)));
        }
    }

    pub fn in_flight(&self, key: &str) -> u32 {
        self.counts.get(key).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_once_max_is_reached() {
        let guard = ConcurrencyGuard::new();
        assert!(guard.try_acquire("k", 2));
        assert!(guard.try_acquire("k", 2));
        assert!(!guard.try_acquire("k", 2));
        guard.release("k");
        assert!(guard.try_acquire("k", 2));
    }

    #[test]
    fn zero_max_is_unbounded() {
        let guard = ConcurrencyGuard::new();
        for _ in 0..50 {
            assert!(guard.try_acquire("k", 0));
        }
    }

    #[test]
    fn release_below_zero_saturates() {
        let guard = ConcurrencyGuard::new();
        guard.release("never-acquired");
        assert_eq!(guard.in_flight("never-acquired"), 0);
    }
}
