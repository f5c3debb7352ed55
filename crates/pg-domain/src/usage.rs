//! `UsageEvent` and `AdminEvent` — the two event shapes delivered over the
//! webhook channel and recorded by the usage meter / audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    /// Unmasked — consumers (webhooks, dashboards) mask before display.
    pub api_key: String,
    pub key_name: String,
    pub tool: String,
    pub credits_charged: u64,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_surcharge: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminEventType {
    KeyCreated,
    KeyRevoked,
    KeyRotated,
    KeyTopup,
    KeySuspended,
    KeyResumed,
    KeyExpired,
    KeyCreditsTransferred,
    KeyAutoTopupConfigured,
    KeyAutoToppedUp,
    TokenRevoked,
    AdminKeyCreated,
    AdminKeyRevoked,
    AlertFired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminEvent {
    #[serde(rename = "type")]
    pub kind: AdminEventType,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub metadata: serde_json::Value,
}

impl AdminEvent {
    pub fn new(kind: AdminEventType, actor: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            actor: actor.into(),
            metadata,
        }
    }
}
