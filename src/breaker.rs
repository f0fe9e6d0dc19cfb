//! Per-server circuit breaker for fault isolation.
//!
//! CLOSED → OPEN on `failure_threshold` consecutive failures; OPEN → HALF_OPEN
//! once `recovery_timeout` has elapsed since the last failure; HALF_OPEN lets
//! exactly the next request through as a probe. Grounded on
//! `original_source/router/circuit_breaker.py`; the registry's
//! lazy-materialize-on-first-access pattern (`get` inserts if absent) is
//! kept verbatim.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: State,
    pub failures: u32,
    pub failure_threshold: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: State,
    failures: u32,
    /// Monotonic clock value; used for the `recovery_timeout` comparison.
    last_failure: Option<Instant>,
    /// Wall-clock timestamps surfaced in `status()`, mirroring the
    /// original's `isoformat()` fields.
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

/// A single server's breaker. Interior state is behind a `Mutex` so the
/// breaker can be shared via `Arc` across the task that dispatches a
/// request and the one that records its outcome.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner { state: State::Closed, failures: 0, last_failure: None, last_failure_at: None, last_success_at: None }),
        }
    }

    /// Returns true if a request should be attempted. OPEN transitions to
    /// HALF_OPEN and admits the request once `recovery_timeout` has passed
    /// since the last recorded failure.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            State::Closed => true,
            State::Open => {
                if let Some(last) = inner.last_failure {
                    if last.elapsed() > self.recovery_timeout {
                        inner.state = State::HalfOpen;
                        return true;
                    }
                }
                false
            }
            State::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.failures = 0;
        inner.state = State::Closed;
        inner.last_success_at = Some(Utc::now());
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());
        if inner.failures >= self.failure_threshold {
            inner.state = State::Open;
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.failures = 0;
        inner.state = State::Closed;
        inner.last_failure = None;
        inner.last_failure_at = None;
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            failure_threshold: self.failure_threshold,
            last_failure: inner.last_failure_at,
            last_success: inner.last_success_at,
        }
    }
}

/// Registry of per-server breakers, materialized lazily on first `get`.
#[derive(Debug)]
pub struct BreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self { failure_threshold, recovery_timeout, breakers: Mutex::new(HashMap::new()) }
    }

    /// Get or lazily create the breaker for `server`.
    pub fn get(&self, server: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("registry mutex poisoned");
        breakers
            .entry(server.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(server, self.failure_threshold, self.recovery_timeout)))
            .clone()
    }

    pub fn all_status(&self) -> Vec<BreakerStatus> {
        let breakers = self.breakers.lock().expect("registry mutex poisoned");
        breakers.values().map(|b| b.status()).collect()
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().expect("registry mutex poisoned");
        for b in breakers.values() {
            b.reset();
        }
    }

    pub fn reset(&self, server: &str) -> bool {
        let breakers = self.breakers.lock().expect("registry mutex poisoned");
        match breakers.get(server) {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let b = CircuitBreaker::new("svc", 3, Duration::from_secs(30));
        assert!(b.can_execute());
        b.record_failure();
        b.record_failure();
        assert!(b.can_execute());
        b.record_failure();
        assert!(!b.can_execute());
        assert_eq!(b.status().state, State::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let b = CircuitBreaker::new("svc", 3, Duration::from_secs(30));
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.status().failures, 0);
        assert_eq!(b.status().state, State::Closed);
    }

    #[test]
    fn half_open_after_recovery_timeout() {
        let b = CircuitBreaker::new("svc", 1, Duration::from_millis(10));
        b.record_failure();
        assert!(!b.can_execute());
        std::thread::sleep(Duration::from_millis(20));
        assert!(b.can_execute());
        assert_eq!(b.status().state, State::HalfOpen);
    }

    #[test]
    fn registry_lazily_materializes_breakers() {
        let reg = BreakerRegistry::default();
        assert!(reg.all_status().is_empty());
        let _ = reg.get("svc-a");
        assert_eq!(reg.all_status().len(), 1);
        let _ = reg.get("svc-a");
        assert_eq!(reg.all_status().len(), 1);
    }

    #[test]
    fn reset_unknown_server_returns_false() {
        let reg = BreakerRegistry::default();
        assert!(!reg.reset("missing"));
    }
}
