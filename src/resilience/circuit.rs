//! Per-provider circuit breaker.
//!
//! # States
//!
//! - **Closed**: calls pass through. Consecutive failures are counted; reaching
//!   the threshold inside the failure window opens the circuit.
//! - **Open**: calls are refused without touching the provider until the reset
//!   timeout elapses.
//! - **HalfOpen**: exactly one trial call is admitted. Success closes the
//!   circuit, failure re-opens it with a fresh timeout.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use super::clock::ArcClock;

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Failures older than this (relative to the first of the streak) start a new streak.
    pub failure_window: Duration,
    /// How long the circuit stays open before admitting a trial call.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Externally visible circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed {
        failure_count: u32,
        streak_started: Option<Instant>,
    },
    Open {
        until: Instant,
    },
    HalfOpen {
        trial_in_flight: bool,
    },
}

impl BreakerState {
    fn closed() -> Self {
        Self::Closed {
            failure_count: 0,
            streak_started: None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    times_opened: u64,
}

/// Refusal returned while the circuit does not admit calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpen {
    pub provider: String,
    /// Time until a trial call is admitted; `None` while a trial is in flight
    pub retry_in: Option<Duration>,
}

/// Read-only view of a breaker.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub provider: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub times_opened: u64,
    pub last_failure_secs_ago: Option<u64>,
    pub retry_in_secs: Option<u64>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    clock: ArcClock,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig, clock: ArcClock) -> Self {
        Self {
            provider: provider.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::closed(),
                consecutive_failures: 0,
                last_failure: None,
                times_opened: 0,
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Asks for permission to call the provider.
    ///
    /// An expired open circuit moves to half-open and the caller becomes the trial.
    pub fn acquire(&self) -> Result<(), CircuitOpen> {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { until } if now >= until => {
                tracing::info!(
                    provider = %self.provider,
                    "Circuit half-open, admitting trial call"
                );
                inner.state = BreakerState::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(())
            }
            BreakerState::Open { until } => Err(CircuitOpen {
                provider: self.provider.clone(),
                retry_in: Some(until - now),
            }),
            BreakerState::HalfOpen {
                trial_in_flight: false,
            } => {
                inner.state = BreakerState::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(())
            }
            BreakerState::HalfOpen {
                trial_in_flight: true,
            } => Err(CircuitOpen {
                provider: self.provider.clone(),
                retry_in: None,
            }),
        }
    }

    /// Returns `true` if a call would currently be admitted, without claiming it.
    pub fn is_admitting(&self) -> bool {
        let now = self.clock.now();
        match self.lock().state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } => now >= until,
            BreakerState::HalfOpen { trial_in_flight } => !trial_in_flight,
        }
    }

    /// The provider answered (found or authoritative not-found).
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen { .. } => {
                tracing::info!(provider = %self.provider, "Trial call succeeded, circuit closed");
                inner.state = BreakerState::closed();
                inner.consecutive_failures = 0;
            }
            BreakerState::Closed { .. } => {
                inner.state = BreakerState::closed();
                inner.consecutive_failures = 0;
            }
            // Opened by a concurrent caller
            BreakerState::Open { .. } => {}
        }
    }

    /// The call failed transiently after retries were exhausted.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.last_failure = Some(now);

        match inner.state {
            BreakerState::Closed {
                failure_count,
                streak_started,
            } => {
                let (count, started) = match streak_started {
                    Some(started) if now.duration_since(started) <= self.config.failure_window => {
                        (failure_count + 1, started)
                    }
                    _ => (1, now),
                };
                inner.consecutive_failures = count;

                if count >= self.config.failure_threshold {
                    tracing::warn!(
                        provider = %self.provider,
                        failures = count,
                        "Circuit opened"
                    );
                    inner.state = BreakerState::Open {
                        until: now + self.config.reset_timeout,
                    };
                    inner.times_opened += 1;
                } else {
                    inner.state = BreakerState::Closed {
                        failure_count: count,
                        streak_started: Some(started),
                    };
                }
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(provider = %self.provider, "Trial call failed, circuit re-opened");
                inner.consecutive_failures += 1;
                inner.state = BreakerState::Open {
                    until: now + self.config.reset_timeout,
                };
                inner.times_opened += 1;
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// The call ended with an outcome that says nothing about provider health.
    /// Frees the half-open trial slot without changing state.
    pub fn release(&self) {
        let mut inner = self.lock();
        if let BreakerState::HalfOpen { .. } = inner.state {
            inner.state = BreakerState::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    /// Forces the circuit closed and clears failure counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::closed();
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        tracing::info!(provider = %self.provider, "Circuit reset");
    }

    pub fn state(&self) -> CircuitState {
        match self.lock().state {
            BreakerState::Closed { .. } => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = self.clock.now();
        let inner = self.lock();
        let (state, retry_in_secs) = match inner.state {
            BreakerState::Closed { .. } => (CircuitState::Closed, None),
            BreakerState::Open { until } => (
                CircuitState::Open,
                Some(until.saturating_duration_since(now).as_secs()),
            ),
            BreakerState::HalfOpen { .. } => (CircuitState::HalfOpen, None),
        };

        CircuitSnapshot {
            provider: self.provider.clone(),
            state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            times_opened: inner.times_opened,
            last_failure_secs_ago: inner
                .last_failure
                .map(|at| now.saturating_duration_since(at).as_secs()),
            retry_in_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use std::sync::Arc;

    fn breaker(threshold: u32) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        };
        (
            CircuitBreaker::new("openlibrary", config, Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let (breaker, _clock) = breaker(3);
        for _ in 0..2 {
            assert!(breaker.acquire().is_ok());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        assert!(breaker.acquire().is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let refusal = breaker.acquire().unwrap_err();
        assert_eq!(refusal.provider, "openlibrary");
        assert_eq!(refusal.retry_in, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_success_resets_streak() {
        let (breaker, _clock) = breaker(3);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 2);
    }

    #[test]
    fn test_failures_outside_window_start_new_streak() {
        let (breaker, clock) = breaker(3);
        breaker.record_failure();
        breaker.record_failure();
        clock.advance(Duration::from_secs(61));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure();
        assert!(breaker.acquire().is_err());

        clock.advance(Duration::from_secs(30));
        assert!(breaker.is_admitting());
        assert!(breaker.acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let second = breaker.acquire().unwrap_err();
        assert_eq!(second.retry_in, None);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
        assert!(breaker.acquire().is_ok());
    }

    #[test]
    fn test_failed_trial_restarts_timeout() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure();
        clock.advance(Duration::from_secs(30));
        assert!(breaker.acquire().is_ok());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(29));
        assert!(breaker.acquire().is_err());
        clock.advance(Duration::from_secs(1));
        assert!(breaker.acquire().is_ok());
        assert_eq!(breaker.snapshot().times_opened, 2);
    }

    #[test]
    fn test_release_frees_trial_slot() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure();
        clock.advance(Duration::from_secs(30));
        assert!(breaker.acquire().is_ok());
        breaker.release();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.acquire().is_ok());
    }

    #[test]
    fn test_reset_closes_open_circuit() {
        let (breaker, _clock) = breaker(1);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_failure_secs_ago.is_none());
        assert!(breaker.acquire().is_ok());
    }
}
