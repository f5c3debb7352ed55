//! `PermissionRule` and its compound conditions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEffect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    TimeRange {
        start_hour: u32,
        end_hour: u32,
        #[serde(default)]
        tz: Option<String>,
    },
    Environment {
        allowed: Vec<String>,
    },
    IpCidr {
        ranges: Vec<String>,
    },
    MaxPayloadBytes {
        max_bytes: u64,
    },
    ToolPattern {
        patterns: Vec<String>,
    },
    Custom {
        key: String,
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    pub id: String,
    pub name: String,
    pub effect: RuleEffect,
    /// Higher priority evaluates first.
    pub priority: i64,
    pub conditions: Vec<Condition>,
    pub active: bool,
}
