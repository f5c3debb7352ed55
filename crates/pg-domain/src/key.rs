//! `ApiKeyRecord` — the identity and economic state of an API credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Daily/monthly auto-topup configuration attached to a key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutoTopup {
    pub enabled: bool,
    /// Trigger a top-up once `credits` falls below this threshold.
    pub threshold: u64,
    /// Credits granted per auto-topup.
    pub amount: u64,
    /// Maximum number of auto-topups per day.
    pub max_per_day: u32,
    /// Today's auto-topup count; reset lazily alongside the quota counters.
    pub count_today: u32,
    pub last_reset_day: Option<chrono::NaiveDate>,
}

/// Daily/monthly call and credit caps with their rolling counters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Quota {
    pub daily_call_limit: u64,
    pub monthly_call_limit: u64,
    pub daily_credit_limit: u64,
    pub monthly_credit_limit: u64,

    pub daily_calls: u64,
    pub monthly_calls: u64,
    pub daily_credits: u64,
    pub monthly_credits: u64,

    pub last_reset_day: Option<chrono::NaiveDate>,
    pub last_reset_month: Option<(i32, u32)>,
}

impl Quota {
    /// Lazily roll the daily/monthly counters over if the stamped day/month
    /// differs from `today`. Mutates in place; callers invoke this before
    /// reading or incrementing counters.
    pub fn roll_if_stale(&mut self, today: chrono::NaiveDate) {
        use chrono::Datelike;
        if self.last_reset_day != Some(today) {
            self.daily_calls = 0;
            self.daily_credits = 0;
            self.last_reset_day = Some(today);
        }
        let this_month = (today.year(), today.month());
        if self.last_reset_month != Some(this_month) {
            self.monthly_calls = 0;
            self.monthly_credits = 0;
            self.last_reset_month = Some(this_month);
        }
    }

    /// `None` = no limit configured for that dimension.
    pub fn daily_call_headroom(&self) -> Option<u64> {
        (self.daily_call_limit > 0).then(|| self.daily_call_limit.saturating_sub(self.daily_calls))
    }

    pub fn monthly_call_headroom(&self) -> Option<u64> {
        (self.monthly_call_limit > 0)
            .then(|| self.monthly_call_limit.saturating_sub(self.monthly_calls))
    }

    pub fn daily_credit_headroom(&self) -> Option<u64> {
        (self.daily_credit_limit > 0)
            .then(|| self.daily_credit_limit.saturating_sub(self.daily_credits))
    }

    pub fn monthly_credit_headroom(&self) -> Option<u64> {
        (self.monthly_credit_limit > 0)
            .then(|| self.monthly_credit_limit.saturating_sub(self.monthly_credits))
    }
}

/// A single API credential and its full economic/policy state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// `pg_` + 64 hex chars.
    pub key: String,
    pub name: String,

    pub credits: u64,
    pub total_spent: u64,
    pub total_calls: u64,
    /// 0 = no limit.
    pub spending_limit: u64,
    pub auto_topup: AutoTopup,

    pub active: bool,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,

    pub allowed_tools: HashSet<String>,
    pub denied_tools: HashSet<String>,
    pub quota: Quota,
    pub ip_allowlist: Vec<String>,
    pub tags: Vec<String>,
    pub namespace: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,

    pub plan: Option<String>,
    pub team_id: Option<String>,
}

impl ApiKeyRecord {
    /// Whether `tool` may be called under this key's ACL alone (denied
    /// wins; an empty allow list means "all tools allowed").
    pub fn tool_allowed(&self, tool: &str) -> bool {
        if self.denied_tools.contains(tool) {
            return false;
        }
        self.allowed_tools.is_empty() || self.allowed_tools.contains(tool)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> Result<(), crate::deny::DenyReason> {
        use crate::deny::DenyReason;
        if !self.active {
            return Err(DenyReason::KeyInactive);
        }
        if self.suspended {
            return Err(DenyReason::KeySuspended);
        }
        if let Some(exp) = self.expires_at {
            if now >= exp {
                return Err(DenyReason::KeyExpired);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_allowed_denied_wins_over_allowed() {
        let mut rec = sample();
        rec.allowed_tools.insert("search".into());
        rec.denied_tools.insert("search".into());
        assert!(!rec.tool_allowed("search"));
    }

    #[test]
    fn empty_allow_list_allows_everything_not_denied() {
        let mut rec = sample();
        rec.denied_tools.insert("delete".into());
        assert!(rec.tool_allowed("search"));
        assert!(!rec.tool_allowed("delete"));
    }

    #[test]
    fn quota_rolls_over_on_new_day() {
        let mut q = Quota {
            daily_call_limit: 10,
            daily_calls: 10,
            last_reset_day: Some(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ..Default::default()
        };
        q.roll_if_stale(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(q.daily_calls, 0);
    }

    fn sample() -> ApiKeyRecord {
        ApiKeyRecord {
            key: "pg_test".into(),
            name: "test".into(),
            credits: 100,
            total_spent: 0,
            total_calls: 0,
            spending_limit: 0,
            auto_topup: AutoTopup::default(),
            active: true,
            suspended: false,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
            allowed_tools: HashSet::new(),
            denied_tools: HashSet::new(),
            quota: Quota::default(),
            ip_allowlist: Vec::new(),
            tags: Vec::new(),
            namespace: None,
            webhook_url: None,
            webhook_secret: None,
            plan: None,
            team_id: None,
        }
    }
}
