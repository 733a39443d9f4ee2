//! Per-service circuit breaker.
//!
//! CLOSED counts failures, with each success taking one back. Reaching the
//! threshold opens the circuit. After the recovery timeout the next call
//! moves it to HALF_OPEN, where enough consecutive successes close it again
//! and any failure reopens it.

use crate::clock::Clock;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            success_threshold: success_threshold.max(1),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(300),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Inner {
    Closed { failures: u32 },
    Open { opened_at: DateTime<Utc> },
    HalfOpen { successes: u32 },
}

impl Inner {
    fn state(&self) -> BreakerState {
        match self {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

/// Point-in-time view of a breaker, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: BreakerState,
    pub failures: u32,
    pub opened_at: Option<String>,
}

pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let service = service.into();
        metrics::set_breaker_state(&service, BreakerState::Closed);
        Self {
            service,
            config,
            clock,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Current state, moving OPEN to HALF_OPEN once the recovery timeout has
    /// elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.cool_down(&mut inner);
        inner.state()
    }

    /// Whether a call may go through right now.
    pub fn allow(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        let next = match *inner {
            Inner::Closed { failures } => Inner::Closed {
                failures: failures.saturating_sub(1),
            },
            Inner::HalfOpen { successes } if successes + 1 >= self.config.success_threshold => {
                info!("Circuit for {} closed after successful probes", self.service);
                Inner::Closed { failures: 0 }
            }
            Inner::HalfOpen { successes } => Inner::HalfOpen {
                successes: successes + 1,
            },
            // A call admitted before the circuit opened finished late.
            open @ Inner::Open { .. } => open,
        };
        self.transition(&mut inner, next);
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let now = self.clock.now();
        let next = match *inner {
            Inner::Closed { failures } if failures + 1 >= self.config.failure_threshold => {
                warn!(
                    "Circuit for {} opened after {} failures, cooling down for {:?}",
                    self.service,
                    failures + 1,
                    self.config.recovery_timeout
                );
                Inner::Open { opened_at: now }
            }
            Inner::Closed { failures } => Inner::Closed {
                failures: failures + 1,
            },
            Inner::HalfOpen { .. } => {
                warn!("Circuit for {} reopened by a failed probe", self.service);
                Inner::Open { opened_at: now }
            }
            open @ Inner::Open { .. } => open,
        };
        self.transition(&mut inner, next);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.cool_down(&mut inner);
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.state(),
            failures: match *inner {
                Inner::Closed { failures } => failures,
                _ => 0,
            },
            opened_at: match *inner {
                Inner::Open { opened_at } => Some(opened_at.to_rfc3339()),
                _ => None,
            },
        }
    }

    fn cool_down(&self, inner: &mut Inner) {
        if let Inner::Open { opened_at } = *inner {
            let elapsed = self.clock.now().signed_duration_since(opened_at);
            let timeout = chrono::Duration::from_std(self.config.recovery_timeout)
                .unwrap_or(chrono::Duration::MAX);
            if elapsed > timeout {
                info!("Circuit for {} half-open, letting calls through", self.service);
                self.transition(inner, Inner::HalfOpen { successes: 0 });
            }
        }
    }

    fn transition(&self, inner: &mut Inner, next: Inner) {
        if inner.state() != next.state() {
            metrics::set_breaker_state(&self.service, next.state());
        }
        *inner = next;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Breakers keyed by service name, created on first use.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    service,
                    self.config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_timestamp(10_000));
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default(), clock.clone());
        (breaker, clock)
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let (breaker, _) = breaker();
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn success_decays_failure_count_by_one() {
        let (breaker, _) = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        assert_eq!(breaker.snapshot().failures, 3);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn half_opens_only_after_recovery_timeout() {
        let (breaker, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance(chrono::Duration::seconds(300));
        assert!(!breaker.allow());
        clock.advance(chrono::Duration::seconds(1));
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let (breaker, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance(chrono::Duration::seconds(301));
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().failures, 0);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_timeout() {
        let (breaker, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance(chrono::Duration::seconds(301));
        assert!(breaker.allow());
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        clock.advance(chrono::Duration::seconds(200));
        assert!(!breaker.allow());
        clock.advance(chrono::Duration::seconds(101));
        assert!(breaker.allow());
    }

    #[test]
    fn config_thresholds_are_at_least_one() {
        let config = CircuitBreakerConfig::new(0, Duration::from_secs(1), 0);
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.success_threshold, 1);
    }

    #[test]
    fn registry_hands_out_one_breaker_per_service() {
        let registry = BreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(ManualClock::at_timestamp(0)),
        );
        let a = registry.get("discogs");
        let b = registry.get("discogs");
        assert!(Arc::ptr_eq(&a, &b));
        registry.get("lastfm");
        let services: Vec<String> = registry.snapshots().into_iter().map(|s| s.service).collect();
        assert_eq!(services, vec!["discogs", "lastfm"]);
    }
}
