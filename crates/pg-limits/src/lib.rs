//! Fixed-window and adaptive rate limiting.

pub mod adaptive;
pub mod rate_limiter;

pub use adaptive::{AdaptiveConfig, AdaptiveRateLimiter};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
