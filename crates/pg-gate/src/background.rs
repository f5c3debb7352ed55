//! `BackgroundTasks` — the tickers that keep webhook delivery and
//! revocation bookkeeping moving without blocking the hot path: a webhook flush loop, a webhook retry-queue loop, and a
//! revocation-list purge loop.
//!
//! Unlike `bootstrap::spawn_background_tasks` in the teacher's app, which
//! detaches its tasks with `tokio::spawn` and never retains a handle, this
//! holder keeps every `JoinHandle` and aborts them all on drop so a
//! `Gate`'s background work cannot outlive it.
//!
//! Adaptive-rate reevaluation has no ticker of its own: `Gate::precheck`
//! calls `AdaptiveRateLimiter::evaluate` inline on every rate-limited
//! call, which is already cooldown-gated internally, so a periodic sweep
//! would just be a more expensive way to do the same thing.

use std::sync::Arc;
use std::time::Duration;

use pg_credentials::ScopedTokenMinter;
use pg_webhooks::WebhookEmitter;
use tokio::task::JoinHandle;

const REVOCATION_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const WEBHOOK_RETRY_TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Spawns the webhook flush loop, the webhook retry-scheduler loop,
    /// and the revocation-list purger. `flush_interval_ms` should match
    /// whatever `WebhookConfig` the emitter was constructed with.
    pub fn spawn(webhooks: Arc<WebhookEmitter>, token_minter: Arc<ScopedTokenMinter>, flush_interval_ms: u64) -> Self {
        let mut handles = Vec::with_capacity(3);

        let flush_webhooks = Arc::clone(&webhooks);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(flush_interval_ms.max(1)));
            loop {
                interval.tick().await;
                flush_webhooks.flush().await;
            }
        }));

        let retry_webhooks = Arc::clone(&webhooks);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(WEBHOOK_RETRY_TICK_INTERVAL);
            loop {
                interval.tick().await;
                retry_webhooks.tick_retries().await;
            }
        }));

        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(REVOCATION_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                let purged = token_minter.purge_expired_revocations();
                if purged > 0 {
                    tracing::debug!(purged, "purged expired scoped-token revocations");
                }
            }
        }));

        Self { handles }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
