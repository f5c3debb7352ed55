//! `ResponseCache` — content-addressed LRU cache of tool responses with
//! per-tool TTL.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
struct CacheEntry {
    response: serde_json::Value,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    tool_name: String,
    hit_count: u64,
    last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_milliseconds() > self.ttl_seconds as i64 * 1000
    }
}

#[derive(Debug, Clone, Default)]
struct ToolStats {
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub per_tool: HashMap<String, (u64, u64)>,
}

#[derive(Debug, Default)]
struct Stats {
    hits: u64,
    misses: u64,
    evictions: u64,
    per_tool: HashMap<String, ToolStats>,
}

pub struct ResponseCache {
    max_entries: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: RwLock<Stats>,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(Stats::default()),
        }
    }

    /// Canonical JSON over sorted keys (`serde_json::Value`'s `Map` is
    /// BTreeMap-backed without the `preserve_order` feature, so
    /// `to_string` already emits keys in sorted order). Missing/empty args
    /// canonicalize to `"{}"`.
    pub fn cache_key(tool: &str, args: Option<&serde_json::Value>) -> String {
        let args_json = match args {
            Some(v) if !v.is_null() => v.to_string(),
            _ => "{}".to_string(),
        };
        let preimage = format!("{tool}:{args_json}");
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }

    pub fn get(&self, tool: &str, args: Option<&serde_json::Value>) -> Option<serde_json::Value> {
        let key = Self::cache_key(tool, args);
        let now = Utc::now();

        let mut entries = self.entries.write();
        let expired = match entries.get(&key) {
            Some(e) => e.is_expired(now),
            None => {
                self.record_miss(tool);
                return None;
            }
        };

        if expired {
            entries.remove(&key);
            self.record_miss(tool);
            return None;
        }

        let entry = entries.get_mut(&key).expect("checked present above");
        entry.hit_count += 1;
        entry.last_accessed_at = now;
        let response = entry.response.clone();
        self.record_hit(tool);
        Some(response)
    }

    pub fn set(&self, tool: &str, args: Option<&serde_json::Value>, response: serde_json::Value, ttl_seconds: u64) {
        if ttl_seconds == 0 {
            return;
        }
        let key = Self::cache_key(tool, args);
        let now = Utc::now();

        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries && self.max_entries > 0 {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
                self.stats.write().evictions += 1;
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                created_at: now,
                ttl_seconds,
                tool_name: tool.to_string(),
                hit_count: 0,
                last_accessed_at: now,
            },
        );
    }

    pub fn clear(&self, tool: Option<&str>) {
        let mut entries = self.entries.write();
        match tool {
            Some(t) => entries.retain(|_, e| e.tool_name != t),
            None => entries.clear(),
        }
    }

    /// Opportunistically purges expired entries before reporting` also purges).
    pub fn stats(&self) -> CacheStatsSnapshot {
        let now = Utc::now();
        {
            let mut entries = self.entries.write();
            entries.retain(|_, e| !e.is_expired(now));
        }

        let stats = self.stats.read();
        let per_tool = stats
            .per_tool
            .iter()
            .map(|(k, v)| (k.clone(), (v.hits, v.misses)))
            .collect();

        CacheStatsSnapshot {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            size: self.entries.read().len(),
            per_tool,
        }
    }

    fn record_hit(&self, tool: &str) {
        let mut stats = self.stats.write();
        stats.hits += 1;
        stats.per_tool.entry(tool.to_string()).or_default().hits += 1;
    }

    fn record_miss(&self, tool: &str) {
        let mut stats = self.stats.write();
        stats.misses += 1;
        stats.per_tool.entry(tool.to_string()).or_default().misses += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_is_order_independent() {
        let a = ResponseCache::cache_key("t", Some(&json!({"a": 1, "b": 2})));
        let b = ResponseCache::cache_key("t", Some(&json!({"b": 2, "a": 1})));
        assert_eq!(a, b);
    }

    #[test]
    fn miss_then_hit() {
        let cache = ResponseCache::new(10);
        let args = json!({"q": "x"});
        assert!(cache.get("search", Some(&args)).is_none());
        cache.set("search", Some(&args), json!({"result": 1}), 60);
        assert_eq!(cache.get("search", Some(&args)).unwrap(), json!({"result": 1}));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn zero_ttl_is_ignored() {
        let cache = ResponseCache::new(10);
        cache.set("t", None, json!(1), 0);
        assert!(cache.get("t", None).is_none());
    }

    #[test]
    fn lru_eviction_removes_least_recently_accessed() {
        let cache = ResponseCache::new(2);
        cache.set("t", Some(&json!({"id": 1})), json!(1), 60);
        cache.set("t", Some(&json!({"id": 2})), json!(2), 60);
        // touch id=1 so id=2 becomes the least-recently-accessed
        cache.get("t", Some(&json!({"id": 1})));
        cache.set("t", Some(&json!({"id": 3})), json!(3), 60);

        assert!(cache.get("t", Some(&json!({"id": 2}))).is_none());
        assert!(cache.get("t", Some(&json!({"id": 1}))).is_some());
        assert!(cache.get("t", Some(&json!({"id": 3}))).is_some());
    }

    #[test]
    fn clear_scoped_to_tool() {
        let cache = ResponseCache::new(10);
        cache.set("a", None, json!(1), 60);
        cache.set("b", None, json!(2), 60);
        cache.clear(Some("a"));
        assert!(cache.get("a", None).is_none());
        assert!(cache.get("b", None).is_some());
    }

    #[test]
    fn missing_args_canonicalize_to_empty_object() {
        let a = ResponseCache::cache_key("t", None);
        let b = ResponseCache::cache_key("t", Some(&json!({})));
        assert_eq!(a, b);
    }
}
