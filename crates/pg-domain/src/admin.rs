//! `AdminKeyRecord` and the total role hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Viewer,
    Admin,
    SuperAdmin,
}

impl AdminRole {
    /// `self` outranks or equals `min` — derives from the total order on
    /// the enum's declaration (`Viewer < Admin < SuperAdmin`).
    pub fn at_least(&self, min: AdminRole) -> bool {
        *self >= min
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminKeyRecord {
    /// `admin_` + 32 hex (bootstrap) or `ak_` + 32 hex (non-bootstrap).
    pub key: String,
    pub name: String,
    pub role: AdminRole,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AdminKeyRecord {
    pub const BOOTSTRAP_CREATOR: &'static str = "bootstrap";

    pub fn is_bootstrap(&self) -> bool {
        self.created_by == Self::BOOTSTRAP_CREATOR
    }
}
