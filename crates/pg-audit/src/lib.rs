//! Structured audit trail and per-call usage history.

pub mod audit_log;
pub mod usage_meter;

pub use audit_log::{AuditEntry, AuditLog, AuditQuery, AuditSummary};
pub use usage_meter::{UsageMeter, UsageQuery, UsageSummary};
