//! `AuditLog` — append-only bounded ring of structured events, queryable
//! by actor, type, and time range.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub actor: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub types: Option<Vec<String>>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditSummary {
    pub counts_per_type: HashMap<String, u64>,
    pub top_actors: Vec<(String, u64)>,
    pub hourly_trend: HashMap<String, u64>,
    pub daily_trend: HashMap<String, u64>,
}

pub struct AuditLog {
    capacity: usize,
    entries: RwLock<VecDeque<AuditEntry>>,
    next_id: RwLock<u64>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::new()),
            next_id: RwLock::new(1),
        }
    }

    pub fn log(&self, kind: impl Into<String>, actor: impl Into<String>, message: impl Into<String>, metadata: serde_json::Value) -> u64 {
        let mut next_id = self.next_id.write();
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let entry = AuditEntry {
            id,
            timestamp: Utc::now(),
            kind: kind.into(),
            actor: actor.into(),
            message: message.into(),
            metadata,
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        id
    }

    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        let mut result: Vec<AuditEntry> = entries
            .iter()
            .rev()
            .filter(|e| filter.types.as_ref().map(|ts| ts.iter().any(|t| t == &e.kind)).unwrap_or(true))
            .filter(|e| filter.actor.as_deref().map(|a| a == e.actor).unwrap_or(true))
            .filter(|e| filter.since.map(|s| e.timestamp >= s).unwrap_or(true))
            .filter(|e| filter.until.map(|u| e.timestamp <= u).unwrap_or(true))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        result
    }

    pub fn summary(&self) -> AuditSummary {
        let entries = self.entries.read();
        let mut counts_per_type = HashMap::new();
        let mut actor_counts: HashMap<String, u64> = HashMap::new();
        let mut hourly_trend = HashMap::new();
        let mut daily_trend = HashMap::new();

        for entry in entries.iter() {
            *counts_per_type.entry(entry.kind.clone()).or_insert(0) += 1;
            *actor_counts.entry(entry.actor.clone()).or_insert(0) += 1;
            *hourly_trend.entry(entry.timestamp.format("%Y-%m-%dT%H").to_string()).or_insert(0) += 1;
            *daily_trend.entry(entry.timestamp.format("%Y-%m-%d").to_string()).or_insert(0) += 1;
        }

        let mut top_actors: Vec<(String, u64)> = actor_counts.into_iter().collect();
        top_actors.sort_by(|a, b| b.1.cmp(&a.1));
        top_actors.truncate(10);

        AuditSummary {
            counts_per_type,
            top_actors,
            hourly_trend,
            daily_trend,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_assigns_monotonic_ids() {
        let log = AuditLog::new(10);
        let a = log.log("key.created", "admin1", "created key", json!({}));
        let b = log.log("key.revoked", "admin1", "revoked key", json!({}));
        assert!(b > a);
    }

    #[test]
    fn ring_drops_oldest_beyond_capacity() {
        let log = AuditLog::new(2);
        log.log("a", "u", "m", json!({}));
        log.log("b", "u", "m", json!({}));
        log.log("c", "u", "m", json!({}));
        assert_eq!(log.len(), 2);
        let all = log.query(&AuditQuery::default());
        let kinds: Vec<&str> = all.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["c", "b"]);
    }

    #[test]
    fn query_filters_by_type_and_actor() {
        let log = AuditLog::new(10);
        log.log("key.created", "admin1", "m", json!({}));
        log.log("key.revoked", "admin2", "m", json!({}));

        let by_type = log.query(&AuditQuery { types: Some(vec!["key.created".into()]), ..Default::default() });
        assert_eq!(by_type.len(), 1);

        let by_actor = log.query(&AuditQuery { actor: Some("admin2".into()), ..Default::default() });
        assert_eq!(by_actor.len(), 1);
        assert_eq!(by_actor[0].kind, "key.revoked");
    }

    #[test]
    fn summary_counts_per_type_and_top_actors() {
        let log = AuditLog::new(10);
        log.log("key.created", "admin1", "m", json!({}));
        log.log("key.created", "admin1", "m", json!({}));
        log.log("key.revoked", "admin2", "m", json!({}));

        let summary = log.summary();
        assert_eq!(summary.counts_per_type.get("key.created"), Some(&2));
        assert_eq!(summary.top_actors[0], ("admin1".to_string(), 2));
    }
}
