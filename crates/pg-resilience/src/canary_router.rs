//! `CanaryRouter` — weighted split between a primary and canary upstream
//! backend, with per-backend call and error counters.

use parking_lot::Mutex;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Primary,
    Canary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryEvent {
    Enabled,
    Disabled,
    WeightChanged,
}

#[derive(Debug, Default, Clone, Copy)]
struct BackendCounters {
    calls: u64,
    errors: u64,
}

struct Inner {
    weight: u8,
    primary: BackendCounters,
    canary: BackendCounters,
}

pub struct CanaryRouter {
    inner: Mutex<Inner>,
}

impl CanaryRouter {
    pub fn new(weight: u8) -> Self {
        Self {
            inner: Mutex::new(Inner {
                weight: weight.min(100),
                primary: BackendCounters::default(),
                canary: BackendCounters::default(),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Draws a uniform integer in `[0, 100)` from a cryptographically
    /// unbiased source and compares against the configured weight.
    pub fn route(&self) -> Backend {
        let weight = self.inner.lock().weight;
        if weight == 0 {
            return Backend::Primary;
        }
        if weight >= 100 {
            return Backend::Canary;
        }
        let draw: u8 = rand::thread_rng().gen_range(0..100);
        if draw < weight {
            Backend::Canary
        } else {
            Backend::Primary
        }
    }

    /// Clamps to `[0, 100]`. Returns the observable transition event.
    pub fn set_weight(&self, weight: u8) -> CanaryEvent {
        let clamped = weight.min(100);
        let mut inner = self.inner.lock();
        let was_enabled = inner.weight > 0;
        let will_be_enabled = clamped > 0;
        inner.weight = clamped;

        if !was_enabled && will_be_enabled {
            CanaryEvent::Enabled
        } else if was_enabled && !will_be_enabled {
            CanaryEvent::Disabled
        } else {
            CanaryEvent::WeightChanged
        }
    }

    pub fn weight(&self) -> u8 {
        self.inner.lock().weight
    }

    pub fn record_call(&self, backend: Backend) {
        let mut inner = self.inner.lock();
        match backend {
            Backend::Primary => inner.primary.calls += 1,
            Backend::Canary => inner.canary.calls += 1,
        }
    }

    pub fn record_error(&self, backend: Backend) {
        let mut inner = self.inner.lock();
        match backend {
            Backend::Primary => inner.primary.errors += 1,
            Backend::Canary => inner.canary.errors += 1,
        }
    }

    pub fn stats(&self) -> ((u64, u64), (u64, u64)) {
        let inner = self.inner.lock();
        (
            (inner.primary.calls, inner.primary.errors),
            (inner.canary.calls, inner.canary.errors),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_router_always_routes_primary() {
        let router = CanaryRouter::new(0);
        for _ in 0..50 {
            assert_eq!(router.route(), Backend::Primary);
        }
    }

    #[test]
    fn weight_100_always_routes_canary() {
        let router = CanaryRouter::new(100);
        for _ in 0..50 {
            assert_eq!(router.route(), Backend::Canary);
        }
    }

    #[test]
    fn set_weight_clamps_and_emits_enabled_event() {
        let router = CanaryRouter::new(0);
        assert_eq!(router.set_weight(200), CanaryEvent::Enabled);
        assert_eq!(router.weight(), 100);
    }

    #[test]
    fn set_weight_to_zero_emits_disabled_event() {
        let router = CanaryRouter::new(50);
        assert_eq!(router.set_weight(0), CanaryEvent::Disabled);
    }

    #[test]
    fn set_weight_between_nonzero_values_emits_weight_changed() {
        let router = CanaryRouter::new(50);
        assert_eq!(router.set_weight(75), CanaryEvent::WeightChanged);
    }
}
