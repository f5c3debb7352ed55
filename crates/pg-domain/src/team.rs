//! `Team` — a group of keys sharing a budget and quota.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub description: String,
    /// ≤100, unique across teams (enforced by `TeamRegistry`, not here).
    pub member_keys: HashSet<String>,
    /// 0 = unlimited.
    pub budget: u64,
    pub total_spent: u64,
    pub quota_daily_calls: u64,
    pub quota_daily_credits: u64,
    pub daily_calls_used: u64,
    pub daily_credits_used: u64,
    pub last_reset_day: Option<chrono::NaiveDate>,
    pub active: bool,
    pub tags: std::collections::HashMap<String, String>,
}

impl Team {
    pub fn roll_if_stale(&mut self, today: chrono::NaiveDate) {
        if self.last_reset_day != Some(today) {
            self.daily_calls_used = 0;
            self.daily_credits_used = 0;
            self.last_reset_day = Some(today);
        }
    }

    pub fn budget_allows(&self, additional_credits: u64) -> bool {
        self.budget == 0 || self.total_spent + additional_credits <= self.budget
    }
}
