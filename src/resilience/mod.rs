//! Building blocks of the resilience wrapper around external providers

pub mod cache;
pub mod circuit;
pub mod clock;
pub mod retry;

pub use cache::{CacheStats, TtlCache};
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitSnapshot, CircuitState};
pub use clock::{ArcClock, Clock, ManualClock, SystemClock};
pub use retry::{RetryPolicy, Retryable};
