//! `RetryPolicy` — exponential-backoff retries with a sliding-window retry
//! budget.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;

const BUDGET_WINDOW_MS: i64 = 60_000;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The minimal shape a caller's error needs to expose for retryability
/// checks; callers map their own error type into this before returning.
#[derive(Debug, Clone)]
pub struct RetryableError {
    pub code: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub full_jitter: bool,
    pub retry_budget_percent: f64,
    pub default_retryable_codes: Vec<i32>,
    pub default_retryable_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
            full_jitter: true,
            retry_budget_percent: 20.0,
            default_retryable_codes: vec![408, 429, 500, 502, 503, 504],
            default_retryable_patterns: vec!["timeout".into(), "ECONNRESET".into(), "ETIMEDOUT".into()],
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ToolRetryStats {
    pub attempts: u64,
    pub successes_after_retry: u64,
    pub exhausted: u64,
}

struct BudgetWindow {
    traffic: Vec<i64>,
    retries: Vec<i64>,
}

pub struct RetryPolicy {
    config: RetryConfig,
    window: Mutex<BudgetWindow>,
    stats: DashMap<String, ToolRetryStats>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            window: Mutex::new(BudgetWindow {
                traffic: Vec::new(),
                retries: Vec::new(),
            }),
            stats: DashMap::new(),
        }
    }

    pub fn is_default_retryable(&self, err: &RetryableError) -> bool {
        if let Some(code) = err.code {
            if self.config.default_retryable_codes.contains(&code) {
                return true;
            }
        }
        self.config
            .default_retryable_patterns
            .iter()
            .any(|p| err.message.contains(p.as_str()))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.config.backoff_base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.config.backoff_max_ms);
        let delay_ms = if self.config.full_jitter && capped > 0 {
            rand::thread_rng().gen_range(0..=capped)
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }

    fn record_traffic(&self) {
        let now = now_millis();
        let mut w = self.window.lock();
        w.traffic.retain(|&t| now - t <= BUDGET_WINDOW_MS);
        w.traffic.push(now);
    }

    fn record_retry(&self) {
        let now = now_millis();
        let mut w = self.window.lock();
        w.retries.retain(|&t| now - t <= BUDGET_WINDOW_MS);
        w.retries.push(now);
    }

    /// `traffic < 10` grants a cold-start grace; otherwise the retry ratio
    /// in the rolling window must stay under `retryBudgetPercent`.
    fn budget_allows_retry(&self) -> bool {
        let now = now_millis();
        let mut w = self.window.lock();
        w.traffic.retain(|&t| now - t <= BUDGET_WINDOW_MS);
        w.retries.retain(|&t| now - t <= BUDGET_WINDOW_MS);
        let traffic = w.traffic.len() as f64;
        if traffic < 10.0 {
            return true;
        }
        let retries = w.retries.len() as f64;
        (retries / traffic * 100.0) < self.config.retry_budget_percent
    }

    fn bump(&self, tool: &str, f: impl FnOnce(&mut ToolRetryStats)) {
        let mut entry = self.stats.entry(tool.to_string()).or_default();
        f(&mut entry);
    }

    /// Executes `op` up to `max_retries` additional times. `op` receives
    /// the zero-based attempt number. `retryable` decides whether a given
    /// failure should be retried — pass [`RetryPolicy::is_default_retryable`]
    /// bound to `self` for the default retryability rule, or a custom closure.
    pub async fn execute<Op, Fut, T>(
        &self,
        tool: &str,
        retryable: impl Fn(&RetryableError) -> bool,
        mut op: Op,
    ) -> Result<T, RetryableError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RetryableError>>,
    {
        let mut attempt = 0u32;
        loop {
            self.record_traffic();
            self.bump(tool, |s| s.attempts += 1);

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        self.bump(tool, |s| s.successes_after_retry += 1);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let can_retry = attempt < self.config.max_retries
                        && retryable(&err)
                        && self.budget_allows_retry();

                    if !can_retry {
                        self.bump(tool, |s| s.exhausted += 1);
                        return Err(err);
                    }

                    self.record_retry();
                    let delay = self.delay_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub fn stats_for(&self, tool: &str) -> ToolRetryStats {
        self.stats.get(tool).map(|s| *s.value()).unwrap_or_default()
    }

    pub fn window_utilization(&self) -> (usize, usize) {
        let now = now_millis();
        let mut w = self.window.lock();
        w.traffic.retain(|&t| now - t <= BUDGET_WINDOW_MS);
        w.retries.retain(|&t| now - t <= BUDGET_WINDOW_MS);
        (w.traffic.len(), w.retries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            full_jitter: false,
            ..RetryConfig::default()
        })
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_attempt() {
        let p = policy(3);
        let result: Result<i32, RetryableError> = p
            .execute("t", |e| p.is_default_retryable(e), |_attempt| async { Ok(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(p.stats_for("t").attempts, 1);
    }

    #[tokio::test]
    async fn retries_retryable_error_until_success() {
        let p = policy(3);
        let calls = AtomicU32::new(0);
        let result = p
            .execute("t", |e| p.is_default_retryable(e), |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RetryableError { code: Some(503), message: "fail".into() })
                    } else {
                        Ok::<_, RetryableError>("ok")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(p.stats_for("t").successes_after_retry, 1);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let p = policy(3);
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryableError> = p
            .execute("t", |e| p.is_default_retryable(e), |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RetryableError { code: Some(400), message: "bad request".into() }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retry_budget_blocks_retries_once_traffic_is_established() {
        let p = RetryPolicy::new(RetryConfig {
            max_retries: 5,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
            full_jitter: false,
            retry_budget_percent: 0.0,
            ..RetryConfig::default()
        });

        for _ in 0..10 {
            p.record_traffic();
        }

        let result: Result<(), RetryableError> = p
            .execute("t", |e| p.is_default_retryable(e), |_attempt| async {
                Err(RetryableError { code: Some(503), message: "fail".into() })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(p.stats_for("t").exhausted, 1);
    }
}
