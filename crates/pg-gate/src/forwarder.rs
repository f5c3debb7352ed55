//! `UpstreamForwarder` — cache lookup, canary routing, circuit breaking,
//! and bounded retries around a single upstream round trip.
//! The real transport is out of scope; callers supply an
//! [`UpstreamBackend`] implementation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pg_cache::ResponseCache;
use pg_resilience::{Backend, CanaryRouter, CircuitBreaker, RetryPolicy, RetryableError};
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::ForwarderConfig;

#[derive(Debug, Clone)]
pub struct UpstreamError {
    pub code: Option<i32>,
    pub message: String,
}

/// Failure returned by [`UpstreamForwarder::forward`] once retries are
/// exhausted or the breaker refuses the call outright.
#[derive(Debug, Clone)]
pub enum ForwardError {
    CircuitOpen,
    Timeout { tool: String, ms: u64 },
    Upstream { code: Option<i32>, message: String },
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::CircuitOpen => write!(f, "circuit breaker open"),
            ForwardError::Timeout { tool, ms } => write!(f, "{tool} timed out after {ms}ms"),
            ForwardError::Upstream { code: Some(c), message } => write!(f, "upstream error {c}: {message}"),
            ForwardError::Upstream { code: None, message } => write!(f, "upstream error: {message}"),
        }
    }
}

impl std::error::Error for ForwardError {}

/// Abstract upstream call. The concrete transport (HTTP, gRPC, in-process)
/// lives outside this crate.
#[async_trait]
pub trait UpstreamBackend: Send + Sync {
    async fn call(&self, backend: Backend, tool: &str, args: Option<&Value>) -> Result<Value, UpstreamError>;
}

/// Matches the "upstream interface" result shape: `{result, fromCache,
/// backend, attempts, responseBytes?}`.
#[derive(Debug, Clone)]
pub struct ForwardOutcome {
    pub result: Value,
    pub from_cache: bool,
    pub backend: Backend,
    pub attempts: u32,
    pub response_bytes: Option<u64>,
}

fn byte_len(value: &Value) -> Option<u64> {
    serde_json::to_vec(value).ok().map(|b| b.len() as u64)
}

pub struct UpstreamForwarder {
    config: RwLock<ForwarderConfig>,
    cache: Arc<ResponseCache>,
    canary: Arc<CanaryRouter>,
    breaker: Arc<CircuitBreaker>,
    retry: Arc<RetryPolicy>,
}

impl UpstreamForwarder {
    pub fn new(
        config: ForwarderConfig,
        cache: Arc<ResponseCache>,
        canary: Arc<CanaryRouter>,
        breaker: Arc<CircuitBreaker>,
        retry: Arc<RetryPolicy>,
    ) -> Self {
        Self { config: RwLock::new(config), cache, canary, breaker, retry }
    }

    pub fn configure(&self, config: ForwarderConfig) {
        *self.config.write() = config;
    }

    fn cache_ttl(&self, tool: &str) -> u64 {
        let config = self.config.read();
        config.tool_cache_ttl_seconds.get(tool).copied().unwrap_or(config.global_cache_ttl_seconds)
    }

    fn timeout_ms(&self, tool: &str) -> u64 {
        let config = self.config.read();
        config.tool_timeout_ms.get(tool).copied().unwrap_or(config.global_timeout_ms)
    }

    /// Cache hit short-circuits everything below it: no breaker check, no
    /// canary decision, no retries. A miss routes via the canary, gates on
    /// the breaker, then retries with a per-attempt timeout; every
    /// completed attempt updates the breaker, and the final outcome
    /// updates the canary's per-backend counters.
    pub async fn forward(
        &self,
        tool: &str,
        args: Option<&Value>,
        backend_impl: &dyn UpstreamBackend,
    ) -> Result<ForwardOutcome, ForwardError> {
        let ttl = self.cache_ttl(tool);
        if ttl > 0 {
            if let Some(cached) = self.cache.get(tool, args) {
                let bytes = byte_len(&cached);
                return Ok(ForwardOutcome {
                    result: cached,
                    from_cache: true,
                    backend: Backend::Primary,
                    attempts: 0,
                    response_bytes: bytes,
                });
            }
        }

        let backend = self.canary.route();
        self.canary.record_call(backend);

        if !self.breaker.allow_request() {
            return Err(ForwardError::CircuitOpen);
        }

        let timeout_ms = self.timeout_ms(tool);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_cell = Arc::clone(&attempts);
        let breaker = Arc::clone(&self.breaker);

        let outcome = self
            .retry
            .execute(tool, |e| self.retry.is_default_retryable(e), move |attempt| {
                attempts_cell.store(attempt + 1, Ordering::SeqCst);
                let breaker = Arc::clone(&breaker);
                async move {
                    let result = tokio::time::timeout(
                        Duration::from_millis(timeout_ms),
                        backend_impl.call(backend, tool, args),
                    )
                    .await;

                    match result {
                        Ok(Ok(value)) => {
                            breaker.record_success();
                            Ok(value)
                        }
                        Ok(Err(e)) => {
                            breaker.record_failure();
                            Err(RetryableError { code: e.code, message: e.message })
                        }
                        Err(_) => {
                            breaker.record_failure();
                            Err(RetryableError {
                                code: None,
                                message: format!("timeout after {timeout_ms}ms"),
                            })
                        }
                    }
                }
            })
            .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match outcome {
            Ok(value) => {
                if ttl > 0 {
                    self.cache.set(tool, args, value.clone(), ttl);
                }
                let bytes = byte_len(&value);
                Ok(ForwardOutcome { result: value, from_cache: false, backend, attempts, response_bytes: bytes })
            }
            Err(err) => {
                self.canary.record_error(backend);
                if err.message.starts_with("timeout after") {
                    Err(ForwardError::Timeout { tool: tool.to_string(), ms: timeout_ms })
                } else {
                    Err(ForwardError::Upstream { code: err.code, message: err.message })
                }
            }
        }
    }
}
