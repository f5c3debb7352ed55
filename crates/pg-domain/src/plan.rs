//! `UsagePlan` — tiered policy attached to a key.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePlan {
    pub name: String,
    pub description: String,
    /// 0 = no limit, for every field below.
    pub rate_limit_per_min: u64,
    pub daily_call_limit: u64,
    pub monthly_call_limit: u64,
    pub daily_credit_limit: u64,
    pub monthly_credit_limit: u64,
    pub credit_multiplier: f64,
    pub allowed_tools: HashSet<String>,
    pub denied_tools: HashSet<String>,
    pub max_concurrent: u32,
}

impl Default for UsagePlan {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            rate_limit_per_min: 0,
            daily_call_limit: 0,
            monthly_call_limit: 0,
            daily_credit_limit: 0,
            monthly_credit_limit: 0,
            credit_multiplier: 1.0,
            allowed_tools: HashSet::new(),
            denied_tools: HashSet::new(),
            max_concurrent: 0,
        }
    }
}

impl UsagePlan {
    /// `true` if `name` is non-empty, ≤64 chars, and only alphanumeric,
    /// `_`, or `-`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    pub fn tool_allowed(&self, tool: &str) -> bool {
        if self.denied_tools.contains(tool) {
            return false;
        }
        self.allowed_tools.is_empty() || self.allowed_tools.contains(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(UsagePlan::is_valid_name("pro-tier"));
        assert!(UsagePlan::is_valid_name("free_tier_1"));
    }

    #[test]
    fn invalid_names() {
        assert!(!UsagePlan::is_valid_name(""));
        assert!(!UsagePlan::is_valid_name(&"x".repeat(65)));
        assert!(!UsagePlan::is_valid_name("has space"));
        assert!(!UsagePlan::is_valid_name("has/slash"));
    }

    #[test]
    fn default_multiplier_is_one() {
        assert_eq!(UsagePlan::default().credit_multiplier, 1.0);
    }
}
