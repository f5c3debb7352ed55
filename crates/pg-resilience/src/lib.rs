//! The reliability mesh: circuit breaker, retry policy, canary router.

pub mod canary_router;
pub mod circuit_breaker;
pub mod retry_policy;

pub use canary_router::{Backend, CanaryEvent, CanaryRouter};
pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStats};
pub use retry_policy::{RetryConfig, RetryPolicy, RetryableError, ToolRetryStats};
