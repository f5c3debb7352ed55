//! `Gate` — the metering and policy core. `evaluate` runs the fixed,
//! short-circuiting chain of checks that decides whether a call is
//! admitted and what it costs; `settle` applies the post-call refund and
//! output-surcharge adjustments; `evaluate_batch` pre-checks a group of
//! calls and debits once for the sum.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use pg_audit::{AuditLog, UsageMeter};
use pg_credentials::ScopedTokenMinter;
use pg_domain::deny::DenyReason;
use pg_domain::key::ApiKeyRecord;
use pg_domain::permission::RuleEffect;
use pg_domain::token::SCOPED_TOKEN_PREFIX;
use pg_domain::usage::UsageEvent;
use pg_keystore::{KeyStore, KeyStoreError};
use pg_limits::{AdaptiveRateLimiter, RateLimiter};
use pg_policy::{EvalContext, PermissionEngine, TeamRegistry, UsagePlanRegistry};
use pg_schema::SchemaValidator;
use pg_webhooks::WebhookEmitter;
use serde_json::Value;
use uuid::Uuid;

use crate::concurrency::ConcurrencyGuard;
use crate::config::{ChargePolicy, GateConfig};
use crate::decision::{BatchOutcome, Call, CallContext, Decision, SettlementInput, SettlementOutcome};

fn map_token_error(err: pg_domain::token::TokenValidationError) -> DenyReason {
    use pg_domain::token::TokenValidationError as T;
    match err {
        T::TokenRevoked => DenyReason::TokenRevoked,
        T::TokenExpired | T::TokenTtlExceeded => DenyReason::TokenExpired,
        T::Malformed | T::InvalidSignature | T::MalformedPayload | T::MissingRequiredFields => {
            DenyReason::InvalidScopedToken
        }
    }
}

fn map_keystore_error(err: KeyStoreError) -> DenyReason {
    match err {
        KeyStoreError::KeyNotFound => DenyReason::UnknownApiKey,
        KeyStoreError::KeyInactive => DenyReason::KeyInactive,
        KeyStoreError::KeySuspended => DenyReason::KeySuspended,
        KeyStoreError::KeyExpired => DenyReason::KeyExpired,
        KeyStoreError::InsufficientCredits => DenyReason::InsufficientCredits,
        KeyStoreError::SpendingLimitExceeded => DenyReason::SpendingLimitExceeded,
    }
}

/// A fully-resolved, priced, and debited call.
struct Resolved {
    key: ApiKeyRecord,
    price: u64,
    concurrency_acquired: bool,
}

/// Everything short of the final debit: every check up to and including
/// price computation has passed.
struct Precheck {
    key: ApiKeyRecord,
    price: u64,
    concurrency_acquired: bool,
}

/// A denial from anywhere in the chain, carrying enough state for the
/// caller to unwind (release a held concurrency slot, log under the
/// resolved key if one was found) and for shadow mode to re-price as a
/// zero-charge allow.
struct DenyError {
    reason: DenyReason,
    attempted_key: Option<String>,
    concurrency_acquired: bool,
}

pub struct Gate {
    config: RwLock<GateConfig>,
    keystore: Arc<KeyStore>,
    token_minter: Arc<ScopedTokenMinter>,
    rate_limiter: Arc<RateLimiter>,
    adaptive: Arc<AdaptiveRateLimiter>,
    concurrency: ConcurrencyGuard,
    plans: Arc<UsagePlanRegistry>,
    permissions: Arc<PermissionEngine>,
    teams: Arc<TeamRegistry>,
    schemas: Arc<SchemaValidator>,
    usage_meter: Arc<UsageMeter>,
    audit: Arc<AuditLog>,
    webhooks: Arc<WebhookEmitter>,
}

#[allow(clippy::too_many_arguments)]
impl Gate {
    pub fn new(
        config: GateConfig,
        keystore: Arc<KeyStore>,
        token_minter: Arc<ScopedTokenMinter>,
        rate_limiter: Arc<RateLimiter>,
        adaptive: Arc<AdaptiveRateLimiter>,
        plans: Arc<UsagePlanRegistry>,
        permissions: Arc<PermissionEngine>,
        teams: Arc<TeamRegistry>,
        schemas: Arc<SchemaValidator>,
        usage_meter: Arc<UsageMeter>,
        audit: Arc<AuditLog>,
        webhooks: Arc<WebhookEmitter>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            keystore,
            token_minter,
            rate_limiter,
            adaptive,
            concurrency: ConcurrencyGuard::new(),
            plans,
            permissions,
            teams,
            schemas,
            usage_meter,
            audit,
            webhooks,
        }
    }

    pub fn configure(&self, config: GateConfig) {
        *self.config.write() = config;
    }

    pub fn config_snapshot(&self) -> GateConfig {
        self.config.read().clone()
    }

    /// Runs the full admission chain for one call and returns the
    /// resulting [`Decision`]. Synchronous: nothing here suspends.
    pub fn evaluate(&self, credential: &str, call: &Call, ctx: &CallContext) -> Decision {
        let config = self.config.read().clone();

        if config.free_methods.contains(&call.tool) {
            return Decision {
                id: Uuid::new_v4(),
                allowed: true,
                credits_charged: 0,
                reason: "free_method".to_string(),
                key: None,
                output_surcharge_per_kb: None,
                cache_bypass: false,
                deny_reason: None,
                tool: call.tool.clone(),
                concurrency_acquired: false,
            };
        }

        match self.resolve(&config, credential, call, ctx) {
            Ok(resolved) => {
                self.teams.record_usage(&resolved.key.key, resolved.price);
                let decision = Decision {
                    id: Uuid::new_v4(),
                    allowed: true,
                    credits_charged: resolved.price,
                    reason: "ok".to_string(),
                    output_surcharge_per_kb: config
                        .tool_pricing
                        .get(&call.tool)
                        .and_then(|p| p.credits_per_kb_output),
                    cache_bypass: false,
                    deny_reason: None,
                    tool: call.tool.clone(),
                    concurrency_acquired: resolved.concurrency_acquired,
                    key: Some(resolved.key.clone()),
                };
                self.record_outcome(&decision, &resolved.key.key, &resolved.key.name, None);
                decision
            }
            Err(err) => {
                self.adaptive.record_denial(err.attempted_key.as_deref().unwrap_or(""));

                let (allowed, reason, concurrency_acquired) = if config.shadow_mode {
                    tracing::debug!(reason = %err.reason, tool = %call.tool, "shadow mode downgraded a denial");
                    (true, err.reason.shadow_label(), err.concurrency_acquired)
                } else {
                    if err.concurrency_acquired {
                        self.concurrency.release(err.attempted_key.as_deref().unwrap_or(""));
                    }
                    (false, err.reason.as_str().to_string(), false)
                };

                let key_record = err.attempted_key.as_deref().and_then(|k| self.keystore.get(k));
                let key_name = key_record.as_ref().map(|k| k.name.clone()).unwrap_or_default();
                let decision = Decision {
                    id: Uuid::new_v4(),
                    allowed,
                    credits_charged: 0,
                    reason,
                    output_surcharge_per_kb: None,
                    cache_bypass: false,
                    deny_reason: Some(err.reason),
                    tool: call.tool.clone(),
                    concurrency_acquired,
                    key: key_record,
                };
                self.record_outcome(
                    &decision,
                    err.attempted_key.as_deref().unwrap_or(""),
                    &key_name,
                    Some(err.reason),
                );
                decision
            }
        }
    }

    /// Checks matching policy for every call, without debiting, and sums
    /// their prices. If every call passes, debits once for the sum and
    /// returns per-call allow decisions; if any call fails, returns the
    /// index and reason of the first failure and debits nothing.
    pub fn evaluate_batch(&self, credential: &str, calls: &[Call], ctx: &CallContext) -> BatchOutcome {
        let config = self.config.read().clone();
        let mut prechecks: Vec<(usize, Option<Precheck>)> = Vec::with_capacity(calls.len());

        for (idx, call) in calls.iter().enumerate() {
            if config.free_methods.contains(&call.tool) {
                prechecks.push((idx, None));
                continue;
            }
            match self.precheck(&config, credential, call, ctx) {
                Ok(pre) => {
                    if pre.concurrency_acquired {
                        self.concurrency.release(&pre.key.key);
                    }
                    prechecks.push((idx, Some(pre)));
                }
                Err(err) => {
                    if err.concurrency_acquired {
                        self.concurrency.release(err.attempted_key.as_deref().unwrap_or(""));
                    }
                    return BatchOutcome {
                        all_allowed: false,
                        failed_index: Some(idx),
                        reason: Some(err.reason.as_str().to_string()),
                        decisions: Vec::new(),
                    };
                }
            }
        }

        let total: u64 = prechecks.iter().filter_map(|(_, p)| p.as_ref().map(|p| p.price)).sum();
        let actual_key = prechecks.iter().find_map(|(_, p)| p.as_ref().map(|p| p.key.key.clone()));

        let mut decisions = Vec::with_capacity(calls.len());
        let debited_key = match (&actual_key, total) {
            (Some(key), amount) if amount > 0 => match self.keystore.debit(key, amount) {
                Ok(_) => {
                    self.keystore.apply_auto_topup(key);
                    self.teams.record_usage(key, amount);
                    Some(key.clone())
                }
                Err(e) => {
                    return BatchOutcome {
                        all_allowed: false,
                        failed_index: None,
                        reason: Some(map_keystore_error(e).as_str().to_string()),
                        decisions: Vec::new(),
                    };
                }
            },
            _ => actual_key.clone(),
        };

        for (idx, pre) in prechecks {
            let call = &calls[idx];
            match pre {
                None => decisions.push(Decision {
                    id: Uuid::new_v4(),
                    allowed: true,
                    credits_charged: 0,
                    reason: "free_method".to_string(),
                    key: None,
                    output_surcharge_per_kb: None,
                    cache_bypass: false,
                    deny_reason: None,
                    tool: call.tool.clone(),
                    concurrency_acquired: false,
                }),
                Some(p) => {
                    let key = debited_key
                        .as_deref()
                        .and_then(|k| self.keystore.get(k))
                        .unwrap_or(p.key.clone());
                    let decision = Decision {
                        id: Uuid::new_v4(),
                        allowed: true,
                        credits_charged: p.price,
                        reason: "ok".to_string(),
                        output_surcharge_per_kb: self
                            .config
                            .read()
                            .tool_pricing
                            .get(&call.tool)
                            .and_then(|tp| tp.credits_per_kb_output),
                        cache_bypass: false,
                        deny_reason: None,
                        tool: call.tool.clone(),
                        concurrency_acquired: false,
                        key: Some(key.clone()),
                    };
                    self.record_outcome(&decision, &key.key, &key.name, None);
                    decisions.push(decision);
                }
            }
        }

        BatchOutcome { all_allowed: true, failed_index: None, reason: None, decisions }
    }

    /// Intersects the key's ACL, its plan's ACL, and (if present) a scoped
    /// token's narrowed tool list against `tools`. Returns `None` when no
    /// narrowing applies at all (every tool passes through untouched).
    pub fn filter_tools_for_key(&self, credential: &str, tools: &[String]) -> Option<Vec<String>> {
        let (actual_key, scoped_allowed) = self.split_credential(credential).ok()?;
        let key = self.keystore.get(&actual_key)?;

        let filtered: Vec<String> = tools
            .iter()
            .filter(|t| key.tool_allowed(t))
            .filter(|t| self.plans.is_tool_allowed_by_plan(&actual_key, t))
            .filter(|t| scoped_allowed.as_ref().map(|allowed| allowed.contains(*t)).unwrap_or(true))
            .cloned()
            .collect();

        Some(filtered)
    }

    /// Applies the refund (on failure, or on a cache hit under
    /// [`ChargePolicy::FreeOnCacheHit`]) and the output-byte surcharge,
    /// and releases any concurrency slot the decision was holding.
    pub fn settle(&self, decision: &Decision, input: SettlementInput) -> SettlementOutcome {
        let config = self.config.read().clone();

        let Some(key) = decision.key.as_ref() else {
            return SettlementOutcome::default();
        };

        if decision.concurrency_acquired {
            self.concurrency.release(&key.key);
        }

        if !decision.allowed {
            return SettlementOutcome::default();
        }

        let mut refunded = false;
        let mut refund_amount = 0u64;

        if config.cache_charge_policy == ChargePolicy::FreeOnCacheHit
            && input.from_cache
            && decision.credits_charged > 0
        {
            self.keystore.refund(&key.key, decision.credits_charged);
            refunded = true;
            refund_amount = decision.credits_charged;
        } else if !input.success && config.refund_on_failure && decision.credits_charged > 0 {
            self.keystore.refund(&key.key, decision.credits_charged);
            refunded = true;
            refund_amount = decision.credits_charged;
            self.adaptive.record_error(&key.key);

            let event = UsageEvent {
                timestamp: Utc::now(),
                api_key: key.key.clone(),
                key_name: key.name.clone(),
                tool: decision.tool.clone(),
                credits_charged: 0,
                allowed: false,
                deny_reason: Some(DenyReason::UpstreamFailure.as_str().to_string()),
                response_bytes: input.response_bytes,
                output_surcharge: None,
            };
            self.usage_meter.record(event.clone());
            self.webhooks.enqueue_usage(event);
            self.audit.log(
                "gate.upstream_failure",
                key.key.clone(),
                "refunded after upstream failure",
                serde_json::json!({ "tool": decision.tool }),
            );
        }

        let mut output_surcharge = None;
        if input.success {
            if let (Some(rate), Some(bytes)) = (
                config.tool_pricing.get(&decision.tool).and_then(|p| p.credits_per_kb_output),
                input.response_bytes,
            ) {
                let surcharge = ((bytes as f64 / 1024.0) * rate).ceil().max(0.0) as u64;
                if surcharge > 0 {
                    match self.keystore.debit(&key.key, surcharge) {
                        Ok(_) => output_surcharge = Some(surcharge),
                        Err(e) => tracing::warn!(key = %key.key, surcharge, error = e.as_str(), "output surcharge debit failed"),
                    }
                }
            }
        }

        SettlementOutcome { output_surcharge, refunded, refund_amount }
    }

    fn split_credential(&self, credential: &str) -> Result<(String, Option<Vec<String>>), DenyReason> {
        if credential.is_empty() {
            return Err(DenyReason::MissingApiKey);
        }
        if credential.starts_with(SCOPED_TOKEN_PREFIX) {
            let validated = self.token_minter.validate(credential).map_err(map_token_error)?;
            Ok((validated.payload.api_key, validated.payload.allowed_tools))
        } else {
            Ok((credential.to_string(), None))
        }
    }

    /// Steps 2-15 of the admission chain: credential resolution through
    /// price computation, with no debit performed yet.
    fn precheck(&self, config: &GateConfig, credential: &str, call: &Call, ctx: &CallContext) -> Result<Precheck, DenyError> {
        let (actual_key, scoped_allowed) = self.split_credential(credential).map_err(|reason| DenyError {
            reason,
            attempted_key: None,
            concurrency_acquired: false,
        })?;

        let deny = |reason: DenyReason, concurrency_acquired: bool| DenyError {
            reason,
            attempted_key: Some(actual_key.clone()),
            concurrency_acquired,
        };

        self.adaptive.record_call(&actual_key);

        let key = self.keystore.get(&actual_key).ok_or_else(|| deny(DenyReason::UnknownApiKey, false))?;
        key.is_usable(Utc::now()).map_err(|reason| deny(reason, false))?;

        if !key.ip_allowlist.is_empty() {
            let allowed = ctx
                .client_ip
                .map(|ip| pg_domain::net::ip_allowed(&ip, &key.ip_allowlist))
                .unwrap_or(false);
            if !allowed {
                return Err(deny(DenyReason::IpNotAllowed, false));
            }
        }

        if !key.tool_allowed(&call.tool) {
            let reason = if key.denied_tools.contains(&call.tool) {
                DenyReason::ToolDenied
            } else {
                DenyReason::ToolNotAllowed
            };
            return Err(deny(reason, false));
        }

        if let Some(allowed) = &scoped_allowed {
            if !allowed.contains(&call.tool) {
                return Err(deny(DenyReason::TokenToolNotAllowed, false));
            }
        }

        if !self.plans.is_tool_allowed_by_plan(&actual_key, &call.tool) {
            let reason = match self.plans.plan_for_key(&actual_key) {
                Some(plan) if plan.denied_tools.contains(&call.tool) => DenyReason::PlanToolDenied,
                _ => DenyReason::PlanToolNotAllowed,
            };
            return Err(deny(reason, false));
        }

        let eval_ctx = EvalContext {
            environment: ctx.environment.clone(),
            ip: ctx.client_ip,
            payload_bytes: call.args.as_ref().and_then(|v| serde_json::to_vec(v).ok()).map(|b| b.len() as u64),
            extra: HashMap::new(),
        };
        if self.permissions.check(&actual_key, &call.tool, &eval_ctx) == RuleEffect::Deny {
            return Err(deny(DenyReason::PermissionDenied, false));
        }

        let payload = call.args.clone().unwrap_or(Value::Null);
        if !self.schemas.validate(&call.tool, &payload).is_empty() {
            return Err(deny(DenyReason::SchemaValidationFailed, false));
        }

        let plan = self.plans.plan_for_key(&actual_key);

        self.adaptive.evaluate(&actual_key);
        let global_limit = if config.global_rate_limit_per_min > 0 {
            self.adaptive.get_effective_rate(&actual_key, config.global_rate_limit_per_min)
        } else {
            0
        };
        let plan_limit = match &plan {
            Some(p) if p.rate_limit_per_min > 0 => self.adaptive.get_effective_rate(&actual_key, p.rate_limit_per_min),
            _ => 0,
        };
        if let Some(limit) = [global_limit, plan_limit].into_iter().filter(|&v| v > 0).min() {
            if !self.rate_limiter.is_allowed(&actual_key, limit) {
                return Err(deny(DenyReason::RateLimited, false));
            }
            self.rate_limiter.record(&actual_key);
        }
        let tool_limit = config.tool_rate_limit_per_min.get(&call.tool).copied().unwrap_or(0);
        if tool_limit > 0 {
            let tool_ctr = format!("{actual_key}:tool:{}", call.tool);
            if !self.rate_limiter.is_allowed(&tool_ctr, tool_limit) {
                return Err(deny(DenyReason::RateLimited, false));
            }
            self.rate_limiter.record(&tool_ctr);
        }

        let max_concurrent = plan.as_ref().map(|p| p.max_concurrent).unwrap_or(0);
        let concurrency_acquired = if max_concurrent > 0 {
            if !self.concurrency.try_acquire(&actual_key, max_concurrent) {
                return Err(deny(DenyReason::ConcurrencyLimit, false));
            }
            true
        } else {
            false
        };

        let multiplier = self.plans.get_credit_multiplier(&actual_key);
        let base = config.tool_pricing.get(&call.tool).map(|p| p.credits_per_call).unwrap_or(config.default_credits_per_call);
        let price = (base as f64 * multiplier).round().max(0.0) as u64;

        if !self.teams.check_budget(&actual_key, price) {
            return Err(deny(DenyReason::TeamBudgetExceeded, concurrency_acquired));
        }
        if let Some(team) = self.teams.team_for_key(&actual_key) {
            if team.quota_daily_calls > 0 && team.daily_calls_used >= team.quota_daily_calls {
                return Err(deny(DenyReason::TeamDailyCallLimit, concurrency_acquired));
            }
            if team.quota_daily_credits > 0 && team.daily_credits_used + price > team.quota_daily_credits {
                return Err(deny(DenyReason::TeamDailyCreditLimit, concurrency_acquired));
            }
        }

        let quota = self.keystore.peek_quota(&actual_key).unwrap_or_else(|| key.quota.clone());
        if let Some(0) = quota.daily_call_headroom() {
            return Err(deny(DenyReason::DailyCallLimit, concurrency_acquired));
        }
        if let Some(0) = quota.monthly_call_headroom() {
            return Err(deny(DenyReason::MonthlyCallLimit, concurrency_acquired));
        }
        if let Some(h) = quota.daily_credit_headroom() {
            if price > h {
                return Err(deny(DenyReason::DailyCreditLimit, concurrency_acquired));
            }
        }
        if let Some(h) = quota.monthly_credit_headroom() {
            if price > h {
                return Err(deny(DenyReason::MonthlyCreditLimit, concurrency_acquired));
            }
        }

        if key.spending_limit > 0 && key.total_spent + price > key.spending_limit {
            return Err(deny(DenyReason::SpendingLimitExceeded, concurrency_acquired));
        }

        Ok(Precheck { key, price, concurrency_acquired })
    }

    /// `precheck` followed by the real debit and the auto-topup
    /// side-effect.
    fn resolve(&self, config: &GateConfig, credential: &str, call: &Call, ctx: &CallContext) -> Result<Resolved, DenyError> {
        let pre = self.precheck(config, credential, call, ctx)?;

        match self.keystore.debit(&pre.key.key, pre.price) {
            Ok(_) => {
                self.keystore.apply_auto_topup(&pre.key.key);
                let key = self.keystore.get(&pre.key.key).unwrap_or(pre.key);
                Ok(Resolved { key, price: pre.price, concurrency_acquired: pre.concurrency_acquired })
            }
            Err(e) => Err(DenyError {
                reason: map_keystore_error(e),
                attempted_key: Some(pre.key.key.clone()),
                concurrency_acquired: pre.concurrency_acquired,
            }),
        }
    }

    fn record_outcome(&self, decision: &Decision, api_key: &str, key_name: &str, deny_reason: Option<DenyReason>) {
        let event = UsageEvent {
            timestamp: Utc::now(),
            api_key: api_key.to_string(),
            key_name: key_name.to_string(),
            tool: decision.tool.clone(),
            credits_charged: decision.credits_charged,
            allowed: decision.allowed,
            deny_reason: deny_reason.map(|r| r.as_str().to_string()),
            response_bytes: None,
            output_surcharge: None,
        };
        self.usage_meter.record(event.clone());
        self.webhooks.enqueue_usage(event);
        self.audit.log(
            if decision.allowed { "gate.call_allowed" } else { "gate.call_denied" },
            api_key,
            decision.reason.clone(),
            serde_json::json!({ "tool": decision.tool, "credits_charged": decision.credits_charged }),
        );
        tracing::debug!(
            tool = %decision.tool,
            allowed = decision.allowed,
            credits = decision.credits_charged,
            "gate decision"
        );
    }
}
