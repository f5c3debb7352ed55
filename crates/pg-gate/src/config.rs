//! Configuration for [`crate::Gate`] and [`crate::UpstreamForwarder`]:
//! pricing table, free methods, rate ceilings, and the two behaviors left
//! as open design choices (cache charge policy, shadow mode).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Per-tool price, in credits, plus an optional per-kilobyte output
/// surcharge rate applied at settlement time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPricing {
    pub credits_per_call: u64,
    /// Credits charged per kilobyte of response body, rounded up. `None`
    /// disables the surcharge for this tool.
    pub credits_per_kb_output: Option<f64>,
}

/// Whether a cache hit still carries its normal charge.
///
/// Scenario 5 of the settlement contract is deliberately left open: a
/// served-from-cache call can either charge the same as a live call, or be
/// refunded in full. Tests and callers must say which mode they assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargePolicy {
    /// Cache hits charge exactly as a live call would.
    Always,
    /// `Gate::settle` refunds the full charge when the forwarder reports
    /// `from_cache`.
    FreeOnCacheHit,
}

impl Default for ChargePolicy {
    fn default() -> Self {
        ChargePolicy::Always
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// When set, every would-be denial is logged and metered under its
    /// real reason but returned to the caller as an allow with zero
    /// charge, prefixed `shadow:`.
    pub shadow_mode: bool,
    /// Refund the full charge on a reported upstream failure.
    pub refund_on_failure: bool,
    pub default_credits_per_call: u64,
    pub free_methods: HashSet<String>,
    pub tool_pricing: HashMap<String, ToolPricing>,
    pub tool_rate_limit_per_min: HashMap<String, u64>,
    pub global_rate_limit_per_min: u64,
    pub cache_charge_policy: ChargePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            shadow_mode: false,
            refund_on_failure: true,
            default_credits_per_call: 1,
            free_methods: HashSet::new(),
            tool_pricing: HashMap::new(),
            tool_rate_limit_per_min: HashMap::new(),
            global_rate_limit_per_min: 0,
            cache_charge_policy: ChargePolicy::Always,
        }
    }
}

/// Cache TTL and per-attempt timeout, independent of the credit pricing
/// that [`GateConfig`] owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub global_cache_ttl_seconds: u64,
    pub tool_cache_ttl_seconds: HashMap<String, u64>,
    pub global_timeout_ms: u64,
    pub tool_timeout_ms: HashMap<String, u64>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            global_cache_ttl_seconds: 0,
            tool_cache_ttl_seconds: HashMap::new(),
            global_timeout_ms: 30_000,
            tool_timeout_ms: HashMap::new(),
        }
    }
}
