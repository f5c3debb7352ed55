//! `PermissionEngine` — priority-ordered allow/deny rules with compound
//! conditions.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{Timelike, Utc};
use glob::Pattern;
use parking_lot::RwLock;
use pg_domain::net::ip_in_cidr;
use pg_domain::permission::{Condition, PermissionRule, RuleEffect};

#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub environment: Option<String>,
    pub ip: Option<IpAddr>,
    pub payload_bytes: Option<u64>,
    pub extra: HashMap<String, serde_json::Value>,
}

fn current_hour(tz: Option<&str>) -> u32 {
    match tz.and_then(|t| t.parse::<chrono_tz::Tz>().ok()) {
        Some(tz) => Utc::now().with_timezone(&tz).hour(),
        None => Utc::now().hour(),
    }
}

fn in_wrapping_range(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

fn condition_matches(condition: &Condition, tool: &str, ctx: &EvalContext) -> bool {
    match condition {
        Condition::TimeRange { start_hour, end_hour, tz } => {
            in_wrapping_range(current_hour(tz.as_deref()), *start_hour, *end_hour)
        }
        Condition::Environment { allowed } => ctx
            .environment
            .as_deref()
            .map(|env| allowed.iter().any(|a| a == env))
            .unwrap_or(false),
        Condition::IpCidr { ranges } => match ctx.ip {
            Some(ip) => ranges.iter().any(|cidr| ip_in_cidr(&ip, cidr)),
            None => false,
        },
        Condition::MaxPayloadBytes { max_bytes } => ctx.payload_bytes.map(|b| b <= *max_bytes).unwrap_or(true),
        Condition::ToolPattern { patterns } => patterns
            .iter()
            .any(|p| Pattern::new(p).map(|pat| pat.matches(tool)).unwrap_or(false)),
        Condition::Custom { key, value } => ctx.extra.get(key).map(|v| v == value).unwrap_or(false),
    }
}

fn rule_matches(rule: &PermissionRule, tool: &str, ctx: &EvalContext) -> bool {
    rule.conditions.iter().all(|c| condition_matches(c, tool, ctx))
}

struct Inner {
    rules: HashMap<String, PermissionRule>,
    assignments: HashMap<String, Vec<String>>,
}

pub struct PermissionEngine {
    default_effect: RuleEffect,
    inner: RwLock<Inner>,
}

impl PermissionEngine {
    pub fn new(default_effect: RuleEffect) -> Self {
        Self {
            default_effect,
            inner: RwLock::new(Inner {
                rules: HashMap::new(),
                assignments: HashMap::new(),
            }),
        }
    }

    pub fn add_rule(&self, rule: PermissionRule) {
        self.inner.write().rules.insert(rule.id.clone(), rule);
    }

    pub fn remove_rule(&self, id: &str) {
        self.inner.write().rules.remove(id);
    }

    pub fn assign_rules(&self, key: &str, rule_ids: Vec<String>) {
        self.inner.write().assignments.insert(key.to_string(), rule_ids);
    }

    /// Evaluates the key's assigned active rules in descending priority
    /// order; the first whose conditions all pass wins. Falls back to the
    /// engine's configured default when none match.
    pub fn check(&self, key: &str, tool: &str, ctx: &EvalContext) -> RuleEffect {
        let inner = self.inner.read();
        let ids = inner.assignments.get(key).cloned().unwrap_or_default();

        let mut candidates: Vec<&PermissionRule> = ids
            .iter()
            .filter_map(|id| inner.rules.get(id))
            .filter(|r| r.active)
            .collect();
        candidates.sort_by_key(|r| std::cmp::Reverse(r.priority));

        for rule in candidates {
            if rule_matches(rule, tool, ctx) {
                return rule.effect;
            }
        }
        self.default_effect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, effect: RuleEffect, priority: i64, conditions: Vec<Condition>) -> PermissionRule {
        PermissionRule {
            id: id.to_string(),
            name: id.to_string(),
            effect,
            priority,
            conditions,
            active: true,
        }
    }

    #[test]
    fn no_assigned_rules_falls_back_to_default() {
        let engine = PermissionEngine::new(RuleEffect::Allow);
        let ctx = EvalContext::default();
        assert_eq!(engine.check("pg_k1", "anything", &ctx), RuleEffect::Allow);
    }

    #[test]
    fn higher_priority_rule_wins_when_both_match() {
        let engine = PermissionEngine::new(RuleEffect::Allow);
        engine.add_rule(rule("low", RuleEffect::Deny, 1, vec![]));
        engine.add_rule(rule("high", RuleEffect::Allow, 10, vec![]));
        engine.assign_rules("pg_k1", vec!["low".into(), "high".into()]);
        assert_eq!(engine.check("pg_k1", "t", &EvalContext::default()), RuleEffect::Allow);
    }

    #[test]
    fn environment_condition_gates_the_rule() {
        let engine = PermissionEngine::new(RuleEffect::Allow);
        engine.add_rule(rule(
            "prod-only-deny",
            RuleEffect::Deny,
            5,
            vec![Condition::Environment { allowed: vec!["staging".into()] }],
        ));
        engine.assign_rules("pg_k1", vec!["prod-only-deny".into()]);

        let mut ctx = EvalContext::default();
        ctx.environment = Some("production".into());
        assert_eq!(engine.check("pg_k1", "t", &ctx), RuleEffect::Allow); // condition fails, falls to default

        ctx.environment = Some("staging".into());
        assert_eq!(engine.check("pg_k1", "t", &ctx), RuleEffect::Deny);
    }

    #[test]
    fn ip_cidr_condition_requires_ip_present() {
        let engine = PermissionEngine::new(RuleEffect::Allow);
        engine.add_rule(rule(
            "office-only",
            RuleEffect::Allow,
            5,
            vec![Condition::IpCidr { ranges: vec!["10.0.0.0/8".into()] }],
        ));
        engine.add_rule(rule("default-deny", RuleEffect::Deny, 1, vec![]));
        engine.assign_rules("pg_k1", vec!["office-only".into(), "default-deny".into()]);

        let ctx_no_ip = EvalContext::default();
        assert_eq!(engine.check("pg_k1", "t", &ctx_no_ip), RuleEffect::Deny);

        let mut ctx_with_ip = EvalContext::default();
        ctx_with_ip.ip = Some("10.1.2.3".parse().unwrap());
        assert_eq!(engine.check("pg_k1", "t", &ctx_with_ip), RuleEffect::Allow);
    }

    #[test]
    fn tool_pattern_glob_matches() {
        let engine = PermissionEngine::new(RuleEffect::Allow);
        engine.add_rule(rule(
            "deny-admin-tools",
            RuleEffect::Deny,
            5,
            vec![Condition::ToolPattern { patterns: vec!["admin_*".into()] }],
        ));
        engine.assign_rules("pg_k1", vec!["deny-admin-tools".into()]);
        assert_eq!(engine.check("pg_k1", "admin_delete", &EvalContext::default()), RuleEffect::Deny);
        assert_eq!(engine.check("pg_k1", "search", &EvalContext::default()), RuleEffect::Allow);
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let engine = PermissionEngine::new(RuleEffect::Allow);
        let mut r = rule("inactive-deny", RuleEffect::Deny, 100, vec![]);
        r.active = false;
        engine.add_rule(r);
        engine.assign_rules("pg_k1", vec!["inactive-deny".into()]);
        assert_eq!(engine.check("pg_k1", "t", &EvalContext::default()), RuleEffect::Allow);
    }
}
