//! `AdaptiveRateLimiter` — per-key rate multiplier adjusted by recent
//! error/denial behavior.

use dashmap::DashMap;

const WINDOW_MS: i64 = 60_000;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveConfig {
    pub cooldown_seconds: i64,
    /// Fraction in `[0, 1]`, e.g. `0.1` for 10%.
    pub error_rate_threshold: f64,
    pub min_rate_percent: f64,
    pub max_rate_percent: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 30,
            error_rate_threshold: 0.1,
            min_rate_percent: 25.0,
            max_rate_percent: 150.0,
        }
    }
}

#[derive(Debug, Clone)]
struct KeyState {
    calls: Vec<i64>,
    errors: Vec<i64>,
    denials: Vec<i64>,
    multiplier: f64,
    last_evaluated_at: Option<i64>,
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            errors: Vec::new(),
            denials: Vec::new(),
            multiplier: 1.0,
            last_evaluated_at: None,
        }
    }
}

pub struct AdaptiveRateLimiter {
    config: AdaptiveConfig,
    states: DashMap<String, KeyState>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    pub fn record_call(&self, key: &str) {
        self.states.entry(key.to_string()).or_default().calls.push(now_millis());
    }

    pub fn record_error(&self, key: &str) {
        self.states.entry(key.to_string()).or_default().errors.push(now_millis());
    }

    pub fn record_denial(&self, key: &str) {
        self.states.entry(key.to_string()).or_default().denials.push(now_millis());
    }

    fn prune(state: &mut KeyState, now: i64) {
        state.calls.retain(|&t| now - t <= WINDOW_MS);
        state.errors.retain(|&t| now - t <= WINDOW_MS);
        state.denials.retain(|&t| now - t <= WINDOW_MS);
    }

    /// Runs at most once per `cooldownSeconds` per key; a call inside the
    /// cooldown, or with fewer than 5 recent calls, returns the unchanged
    /// current multiplier without re-evaluating.
    pub fn evaluate(&self, key: &str) -> f64 {
        let now = now_millis();
        let mut entry = self.states.entry(key.to_string()).or_default();
        Self::prune(&mut entry, now);

        if let Some(last) = entry.last_evaluated_at {
            if now - last < self.config.cooldown_seconds * 1000 {
                return entry.multiplier;
            }
        }

        let recent_calls = entry.calls.len();
        if recent_calls < 5 {
            return entry.multiplier;
        }

        let recent_errors = entry.errors.len();
        let recent_denials = entry.denials.len();
        let error_rate = recent_errors as f64 / recent_calls as f64;

        if error_rate > self.config.error_rate_threshold {
            entry.multiplier = (entry.multiplier * 0.75).max(self.config.min_rate_percent / 100.0);
        } else if recent_errors == 0 && recent_denials == 0 {
            entry.multiplier = (entry.multiplier * 1.25).min(self.config.max_rate_percent / 100.0);
        }

        entry.last_evaluated_at = Some(now);
        entry.multiplier
    }

    pub fn multiplier(&self, key: &str) -> f64 {
        self.states.get(key).map(|s| s.multiplier).unwrap_or(1.0)
    }

    pub fn get_effective_rate(&self, key: &str, base_rate: u64) -> u64 {
        (base_rate as f64 * self.multiplier(key)).floor() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_leaves_multiplier_unchanged() {
        let limiter = AdaptiveRateLimiter::new(AdaptiveConfig::default());
        limiter.record_call("k1");
        assert_eq!(limiter.evaluate("k1"), 1.0);
    }

    #[test]
    fn high_error_rate_tightens_multiplier() {
        let limiter = AdaptiveRateLimiter::new(AdaptiveConfig::default());
        for _ in 0..10 {
            limiter.record_call("k1");
        }
        for _ in 0..5 {
            limiter.record_error("k1");
        }
        let multiplier = limiter.evaluate("k1");
        assert!((multiplier - 0.75).abs() < 1e-9);
    }

    #[test]
    fn clean_traffic_boosts_multiplier() {
        let limiter = AdaptiveRateLimiter::new(AdaptiveConfig::default());
        for _ in 0..10 {
            limiter.record_call("k1");
        }
        let multiplier = limiter.evaluate("k1");
        assert!((multiplier - 1.25).abs() < 1e-9);
    }

    #[test]
    fn multiplier_never_exceeds_max() {
        let config = AdaptiveConfig {
            cooldown_seconds: 0,
            ..AdaptiveConfig::default()
        };
        let limiter = AdaptiveRateLimiter::new(config);
        for _ in 0..50 {
            limiter.record_call("k1");
        }
        let mut last = 1.0;
        for _ in 0..10 {
            last = limiter.evaluate("k1");
        }
        assert!(last <= config.max_rate_percent / 100.0 + 1e-9);
    }

    #[test]
    fn effective_rate_applies_multiplier() {
        let limiter = AdaptiveRateLimiter::new(AdaptiveConfig::default());
        assert_eq!(limiter.get_effective_rate("unknown", 100), 100);
    }
}
