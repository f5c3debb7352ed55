//! Stable deny-reason codes for `Gate::evaluate` / `Gate::evaluate_batch`.
//!
//! These are the "Client policy" error kind from the error-handling design:
//! expected control flow, carried inside an `allowed: false` decision,
//! never wrapped in [`crate::error::Error`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingApiKey,
    UnknownApiKey,
    KeyInactive,
    KeySuspended,
    KeyExpired,
    InvalidScopedToken,
    TokenRevoked,
    TokenExpired,
    IpNotAllowed,
    ToolDenied,
    ToolNotAllowed,
    TokenToolNotAllowed,
    PlanToolDenied,
    PlanToolNotAllowed,
    PermissionDenied,
    SchemaValidationFailed,
    RateLimited,
    ConcurrencyLimit,
    TeamBudgetExceeded,
    TeamDailyCallLimit,
    TeamDailyCreditLimit,
    DailyCallLimit,
    MonthlyCallLimit,
    DailyCreditLimit,
    MonthlyCreditLimit,
    SpendingLimitExceeded,
    InsufficientCredits,
    UpstreamFailure,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingApiKey => "missing_api_key",
            DenyReason::UnknownApiKey => "unknown_api_key",
            DenyReason::KeyInactive => "key_inactive",
            DenyReason::KeySuspended => "key_suspended",
            DenyReason::KeyExpired => "key_expired",
            DenyReason::InvalidScopedToken => "invalid_scoped_token",
            DenyReason::TokenRevoked => "token_revoked",
            DenyReason::TokenExpired => "token_expired",
            DenyReason::IpNotAllowed => "ip_not_allowed",
            DenyReason::ToolDenied => "tool_denied",
            DenyReason::ToolNotAllowed => "tool_not_allowed",
            DenyReason::TokenToolNotAllowed => "token_tool_not_allowed",
            DenyReason::PlanToolDenied => "plan_tool_denied",
            DenyReason::PlanToolNotAllowed => "plan_tool_not_allowed",
            DenyReason::PermissionDenied => "permission_denied",
            DenyReason::SchemaValidationFailed => "schema_validation_failed",
            DenyReason::RateLimited => "rate_limited",
            DenyReason::ConcurrencyLimit => "concurrency_limit",
            DenyReason::TeamBudgetExceeded => "team_budget_exceeded",
            DenyReason::TeamDailyCallLimit => "team_daily_call_limit",
            DenyReason::TeamDailyCreditLimit => "team_daily_credit_limit",
            DenyReason::DailyCallLimit => "daily_call_limit",
            DenyReason::MonthlyCallLimit => "monthly_call_limit",
            DenyReason::DailyCreditLimit => "daily_credit_limit",
            DenyReason::MonthlyCreditLimit => "monthly_credit_limit",
            DenyReason::SpendingLimitExceeded => "spending_limit_exceeded",
            DenyReason::InsufficientCredits => "insufficient_credits",
            DenyReason::UpstreamFailure => "upstream_failure",
        }
    }

    /// Prefix for shadow-mode: a deny is reported as `allow(reason =
    /// "shadow:<original>")`.
    pub fn shadow_label(&self) -> String {
        format!("shadow:{}", self.as_str())
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
