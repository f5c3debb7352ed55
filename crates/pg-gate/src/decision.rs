//! Request/response shapes that cross the gate boundary.

use std::net::IpAddr;

use pg_domain::deny::DenyReason;
use pg_domain::key::ApiKeyRecord;
use serde_json::Value;
use uuid::Uuid;

/// A single tool invocation awaiting a policy decision.
#[derive(Debug, Clone)]
pub struct Call {
    pub tool: String,
    pub args: Option<Value>,
}

/// Transport-supplied context that accompanies a credential: client IP and
/// caller environment, alongside the tool name and arguments.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub client_ip: Option<IpAddr>,
    pub environment: Option<String>,
}

/// The outcome of [`crate::Gate::evaluate`].
#[derive(Debug, Clone)]
pub struct Decision {
    pub id: Uuid,
    pub allowed: bool,
    pub credits_charged: u64,
    /// Human-readable reason. `"ok"` on a plain allow, `shadow:<reason>`
    /// when shadow mode downgraded a would-be deny, or the raw deny
    /// reason string otherwise.
    pub reason: String,
    pub key: Option<ApiKeyRecord>,
    pub output_surcharge_per_kb: Option<f64>,
    /// Set when the call bypassed the cache on purpose (reserved for
    /// callers that want to force a live round-trip).
    pub cache_bypass: bool,
    /// The underlying deny reason, present even when shadow mode
    /// converted it to an allow, so audit and metering can record the
    /// real cause while the caller only ever sees the shadow label.
    pub deny_reason: Option<DenyReason>,
    pub tool: String,
    /// Whether this decision is holding a concurrency slot that
    /// [`crate::Gate::settle`] must release.
    pub concurrency_acquired: bool,
}

/// What the caller observed after actually making the call, fed back into
/// [`crate::Gate::settle`].
#[derive(Debug, Clone, Default)]
pub struct SettlementInput {
    pub success: bool,
    pub response_bytes: Option<u64>,
    pub from_cache: bool,
}

/// Side effects of settlement: a possible refund and a possible output
/// surcharge debit.
#[derive(Debug, Clone, Default)]
pub struct SettlementOutcome {
    pub output_surcharge: Option<u64>,
    pub refunded: bool,
    pub refund_amount: u64,
}

/// Result of [`crate::Gate::evaluate_batch`]: either every call's decision,
/// or the index and reason of the first one that failed (no decisions are
/// produced and nothing is charged in that case).
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub all_allowed: bool,
    pub failed_index: Option<usize>,
    pub reason: Option<String>,
    pub decisions: Vec<Decision>,
}
