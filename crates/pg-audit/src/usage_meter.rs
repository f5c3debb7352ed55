//! `UsageMeter` — records every evaluated call as a `UsageEvent`. The surrounding `Gate` forwards each recorded event on to the
//! webhook emitter and audit log; this component only owns the bounded,
//! queryable history.

use std::collections::VecDeque;

use parking_lot::RwLock;
use pg_domain::usage::UsageEvent;

#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub api_key: Option<String>,
    pub tool: Option<String>,
    pub allowed: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub allowed_calls: u64,
    pub denied_calls: u64,
    pub total_credits_charged: u64,
}

pub struct UsageMeter {
    capacity: usize,
    events: RwLock<VecDeque<UsageEvent>>,
}

impl UsageMeter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: RwLock::new(VecDeque::new()),
        }
    }

    pub fn record(&self, event: UsageEvent) {
        let mut events = self.events.write();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn query(&self, filter: &UsageQuery) -> Vec<UsageEvent> {
        let events = self.events.read();
        let mut result: Vec<UsageEvent> = events
            .iter()
            .rev()
            .filter(|e| filter.api_key.as_deref().map(|k| k == e.api_key).unwrap_or(true))
            .filter(|e| filter.tool.as_deref().map(|t| t == e.tool).unwrap_or(true))
            .filter(|e| filter.allowed.map(|a| a == e.allowed).unwrap_or(true))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        result
    }

    pub fn summary(&self) -> UsageSummary {
        let events = self.events.read();
        let mut summary = UsageSummary::default();
        for event in events.iter() {
            summary.total_calls += 1;
            if event.allowed {
                summary.allowed_calls += 1;
            } else {
                summary.denied_calls += 1;
            }
            summary.total_credits_charged += event.credits_charged;
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(tool: &str, allowed: bool, credits: u64) -> UsageEvent {
        UsageEvent {
            timestamp: Utc::now(),
            api_key: "pg_k1".to_string(),
            key_name: "k1".to_string(),
            tool: tool.to_string(),
            credits_charged: credits,
            allowed,
            deny_reason: if allowed { None } else { Some("insufficient_credits".to_string()) },
            response_bytes: None,
            output_surcharge: None,
        }
    }

    #[test]
    fn ring_caps_at_capacity() {
        let meter = UsageMeter::new(2);
        meter.record(event("a", true, 1));
        meter.record(event("b", true, 1));
        meter.record(event("c", true, 1));
        assert_eq!(meter.len(), 2);
    }

    #[test]
    fn summary_tallies_allowed_and_denied() {
        let meter = UsageMeter::new(10);
        meter.record(event("a", true, 3));
        meter.record(event("a", false, 0));
        let summary = meter.summary();
        assert_eq!(summary.total_calls, 2);
        assert_eq!(summary.allowed_calls, 1);
        assert_eq!(summary.denied_calls, 1);
        assert_eq!(summary.total_credits_charged, 3);
    }

    #[test]
    fn query_filters_by_tool_and_allowed() {
        let meter = UsageMeter::new(10);
        meter.record(event("search", true, 1));
        meter.record(event("write", false, 0));
        let denied = meter.query(&UsageQuery { allowed: Some(false), ..Default::default() });
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].tool, "write");
    }
}
