//! `KeyStore` — single source of truth for `ApiKeyRecord`s and the only
//! component allowed to mutate credit balances.
//!
//! Concurrency: backed by `dashmap::DashMap`, which shards its internal
//! `RwLock`s by key. Holding a single `get_mut` guard for the whole of a
//! mutating operation gives the "fine-grained mutex keyed by api-key"
//! critical section the design calls for without a
//! hand-rolled lock table.

use std::collections::HashSet;

use chrono::Utc;
use dashmap::DashMap;
use pg_domain::key::{ApiKeyRecord, AutoTopup, Quota};
use rand::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreError {
    KeyNotFound,
    KeyInactive,
    KeySuspended,
    KeyExpired,
    InsufficientCredits,
    SpendingLimitExceeded,
}

impl KeyStoreError {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStoreError::KeyNotFound => "key_not_found",
            KeyStoreError::KeyInactive => "key_inactive",
            KeyStoreError::KeySuspended => "key_suspended",
            KeyStoreError::KeyExpired => "key_expired",
            KeyStoreError::InsufficientCredits => "insufficient_credits",
            KeyStoreError::SpendingLimitExceeded => "spending_limit_exceeded",
        }
    }
}

/// Parameters accepted by [`KeyStore::create_key`]. Everything defaults to
/// "no restriction" so callers only set what they need.
#[derive(Debug, Clone, Default)]
pub struct CreateKeyParams {
    pub name: String,
    pub initial_credits: u64,
    pub spending_limit: u64,
    pub allowed_tools: HashSet<String>,
    pub denied_tools: HashSet<String>,
    pub namespace: Option<String>,
    pub tags: Vec<String>,
    pub plan: Option<String>,
}

pub struct KeyStore {
    keys: DashMap<String, ApiKeyRecord>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
        }
    }

    /// Generate a fresh `pg_`-prefixed identifier: 256 bits of randomness,
    /// hex-encoded to 64 characters.
    pub fn generate_key_id() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        format!("pg_{}", hex::encode(bytes))
    }

    pub fn create_key(&self, params: CreateKeyParams) -> ApiKeyRecord {
        let record = ApiKeyRecord {
            key: Self::generate_key_id(),
            name: params.name,
            credits: params.initial_credits,
            total_spent: 0,
            total_calls: 0,
            spending_limit: params.spending_limit,
            auto_topup: AutoTopup::default(),
            active: true,
            suspended: false,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
            allowed_tools: params.allowed_tools,
            denied_tools: params.denied_tools,
            quota: Quota::default(),
            ip_allowlist: Vec::new(),
            tags: params.tags,
            namespace: params.namespace,
            webhook_url: None,
            webhook_secret: None,
            plan: params.plan,
            team_id: None,
        };
        self.keys.insert(record.key.clone(), record.clone());
        tracing::info!(key = %record.key, "api key created");
        record
    }

    pub fn get(&self, key: &str) -> Option<ApiKeyRecord> {
        self.keys.get(key).map(|e| e.clone())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Rolls the key's quota counters if stale and returns a snapshot, for
    /// callers that need an up-to-date quota read without performing a
    /// debit (the gate's quota checks run before the price is known).
    pub fn peek_quota(&self, key: &str) -> Option<Quota> {
        let mut entry = self.keys.get_mut(key)?;
        entry.quota.roll_if_stale(Utc::now().date_naive());
        Some(entry.quota.clone())
    }

    /// Atomic read-modify-write debit. Lazily rolls daily/monthly counters
    /// before checking limits.
    pub fn debit(&self, key: &str, amount: u64) -> Result<u64, KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        let today = Utc::now().date_naive();

        if !entry.active {
            return Err(KeyStoreError::KeyInactive);
        }
        if entry.suspended {
            return Err(KeyStoreError::KeySuspended);
        }
        if let Some(exp) = entry.expires_at {
            if Utc::now() >= exp {
                return Err(KeyStoreError::KeyExpired);
            }
        }
        if entry.credits < amount {
            return Err(KeyStoreError::InsufficientCredits);
        }

        entry.quota.roll_if_stale(today);

        entry.credits -= amount;
        entry.total_spent += amount;
        entry.total_calls += 1;
        entry.last_used_at = Some(Utc::now());
        entry.quota.daily_calls += 1;
        entry.quota.monthly_calls += 1;
        entry.quota.daily_credits += amount;
        entry.quota.monthly_credits += amount;

        let new_balance = entry.credits;
        tracing::debug!(key = %key, amount, new_balance, "debit applied");
        Ok(new_balance)
    }

    /// Compensates a failed call. Never fails — a missing key is a no-op
    /// (there is nothing left to compensate).
    pub fn refund(&self, key: &str, amount: u64) {
        if let Some(mut entry) = self.keys.get_mut(key) {
            entry.credits += amount;
            entry.total_spent = entry.total_spent.saturating_sub(amount);
            entry.total_calls = entry.total_calls.saturating_sub(1);
            tracing::debug!(key = %key, amount, "refund applied");
        } else {
            tracing::warn!(key = %key, "refund requested for unknown key");
        }
    }

    /// Honors `spendingLimit`: grants that would push `totalSpent` over the
    /// configured limit are rejected (mirrors the debit guard, applied in
    /// reverse — a topup only ever increases `credits`, never `totalSpent`,
    /// so the limit check here is against the key's own `spendingLimit`
    /// acting as a ceiling on how much standing credit it may hold).
    pub fn top_up(&self, key: &str, credits: u64) -> Result<u64, KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        if entry.spending_limit > 0 && entry.credits + credits > entry.spending_limit {
            return Err(KeyStoreError::SpendingLimitExceeded);
        }
        entry.credits += credits;
        Ok(entry.credits)
    }

    /// Fires the auto-topup side-effect: if enabled,
    /// `credits` has fallen below `threshold`, and today's count is under
    /// `maxPerDay`, grants `amount` credits and bumps the daily counter.
    /// Runs under the same per-key critical section as `debit`, so the
    /// check-then-act is atomic. Returns the new balance when a top-up
    /// fired, `None` otherwise.
    pub fn apply_auto_topup(&self, key: &str) -> Option<u64> {
        let mut entry = self.keys.get_mut(key)?;
        if !entry.auto_topup.enabled || entry.credits >= entry.auto_topup.threshold {
            return None;
        }

        let today = Utc::now().date_naive();
        if entry.auto_topup.last_reset_day != Some(today) {
            entry.auto_topup.count_today = 0;
            entry.auto_topup.last_reset_day = Some(today);
        }
        if entry.auto_topup.count_today >= entry.auto_topup.max_per_day {
            return None;
        }

        entry.credits += entry.auto_topup.amount;
        entry.auto_topup.count_today += 1;
        tracing::info!(key = %key, new_balance = entry.credits, "auto-topup applied");
        Some(entry.credits)
    }

    pub fn revoke(&self, key: &str) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.active = false;
        Ok(())
    }

    pub fn suspend(&self, key: &str) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.suspended = true;
        Ok(())
    }

    pub fn resume(&self, key: &str) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.suspended = false;
        Ok(())
    }

    pub fn set_acl(
        &self,
        key: &str,
        allowed: HashSet<String>,
        denied: HashSet<String>,
    ) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.allowed_tools = allowed;
        entry.denied_tools = denied;
        Ok(())
    }

    pub fn set_quota(&self, key: &str, quota: Quota) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.quota = quota;
        Ok(())
    }

    pub fn set_ip_allowlist(&self, key: &str, allowlist: Vec<String>) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.ip_allowlist = allowlist;
        Ok(())
    }

    pub fn set_tags(&self, key: &str, tags: Vec<String>) -> Result<(), KeyStoreError> {
        let mut entry = self.keys.get_mut(key).ok_or(KeyStoreError::KeyNotFound)?;
        entry.tags = tags;
        Ok(())
    }

    /// Snapshot of every record, for external persistence round-trips.
    pub fn all(&self) -> Vec<ApiKeyRecord> {
        self.keys.iter().map(|e| e.value().clone()).collect()
    }

    /// Restore a record verbatim (used by an external persistence layer
    /// replaying a saved snapshot).
    pub fn restore(&self, record: ApiKeyRecord) {
        self.keys.insert(record.key.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_key(credits: u64) -> (KeyStore, String) {
        let store = KeyStore::new();
        let rec = store.create_key(CreateKeyParams {
            initial_credits: credits,
            ..Default::default()
        });
        (store, rec.key)
    }

    #[test]
    fn basic_debit_reduces_balance_and_increments_counters() {
        let (store, key) = store_with_key(10);
        let balance = store.debit(&key, 3).unwrap();
        assert_eq!(balance, 7);
        let rec = store.get(&key).unwrap();
        assert_eq!(rec.total_spent, 3);
        assert_eq!(rec.total_calls, 1);
    }

    #[test]
    fn insufficient_credits_leaves_balance_untouched() {
        let (store, key) = store_with_key(2);
        let err = store.debit(&key, 3).unwrap_err();
        assert_eq!(err, KeyStoreError::InsufficientCredits);
        assert_eq!(store.get(&key).unwrap().credits, 2);
    }

    #[test]
    fn debit_rejects_suspended_key() {
        let (store, key) = store_with_key(10);
        store.suspend(&key).unwrap();
        assert_eq!(store.debit(&key, 1).unwrap_err(), KeyStoreError::KeySuspended);
    }

    #[test]
    fn debit_rejects_inactive_key() {
        let (store, key) = store_with_key(10);
        store.revoke(&key).unwrap();
        assert_eq!(store.debit(&key, 1).unwrap_err(), KeyStoreError::KeyInactive);
    }

    #[test]
    fn refund_restores_credits_and_is_safe_on_unknown_key() {
        let (store, key) = store_with_key(10);
        store.debit(&key, 4).unwrap();
        store.refund(&key, 4);
        let rec = store.get(&key).unwrap();
        assert_eq!(rec.credits, 10);
        assert_eq!(rec.total_spent, 0);
        assert_eq!(rec.total_calls, 0);

        // Never fails even for a key that doesn't exist.
        store.refund("pg_does_not_exist", 100);
    }

    #[test]
    fn top_up_honors_spending_limit() {
        let store = KeyStore::new();
        let rec = store.create_key(CreateKeyParams {
            initial_credits: 5,
            spending_limit: 10,
            ..Default::default()
        });
        assert_eq!(store.top_up(&rec.key, 5).unwrap(), 10);
        assert_eq!(
            store.top_up(&rec.key, 1).unwrap_err(),
            KeyStoreError::SpendingLimitExceeded
        );
    }

    #[test]
    fn auto_topup_fires_below_threshold_and_respects_daily_cap() {
        let store = KeyStore::new();
        let rec = store.create_key(CreateKeyParams {
            initial_credits: 10,
            ..Default::default()
        });
        store
            .keys
            .get_mut(&rec.key)
            .map(|mut e| {
                e.auto_topup = AutoTopup {
                    enabled: true,
                    threshold: 15,
                    amount: 20,
                    max_per_day: 1,
                    count_today: 0,
                    last_reset_day: None,
                };
            });

        assert_eq!(store.apply_auto_topup(&rec.key), Some(30));
        // Second call same day: credits (30) no longer below threshold (15).
        assert_eq!(store.apply_auto_topup(&rec.key), None);
    }

    #[test]
    fn generated_keys_are_prefixed_and_unique() {
        let a = KeyStore::generate_key_id();
        let b = KeyStore::generate_key_id();
        assert!(a.starts_with("pg_"));
        assert_eq!(a.len(), 3 + 64); // 32 bytes -> 64 hex chars
        assert_ne!(a, b);
    }

    #[test]
    fn credits_never_negative_across_many_operations() {
        let (store, key) = store_with_key(100);
        for _ in 0..10 {
            store.debit(&key, 5).unwrap();
        }
        assert_eq!(store.get(&key).unwrap().credits, 50);
        for _ in 0..30 {
            store.refund(&key, 5);
        }
        // credits + total_spent invariant: refunds never drive credits negative
        assert!(store.get(&key).unwrap().credits > 0);
    }
}
