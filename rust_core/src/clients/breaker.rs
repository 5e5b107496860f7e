//! Circuit breaker guarding the catalog client.
//!
//! Closed lets calls through and counts consecutive failures; reaching the
//! threshold opens the circuit. While open, calls are refused until the
//! recovery timeout has passed since the last failure, then the circuit turns
//! half-open and lets probes through. Enough successful probes close it
//! again; any failed probe reopens it.

use parking_lot::Mutex;
use std::env;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Successful half-open probes that close it again.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl BreakerConfig {
    /// `CATALOG_BREAKER_FAILURES`, `CATALOG_BREAKER_RECOVERY_SECS`,
    /// `CATALOG_BREAKER_SUCCESSES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            failure_threshold: env::var("CATALOG_BREAKER_FAILURES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_threshold),
            recovery_timeout: env::var("CATALOG_BREAKER_RECOVERY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.recovery_timeout),
            success_threshold: env::var("CATALOG_BREAKER_SUCCESSES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.success_threshold),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, BreakerConfig::default())
    }

    /// Whether a call may go out now. Moves an open circuit to half-open once
    /// the recovery timeout has elapsed.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let recovered = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.successes = 0;
                    info!(breaker = %self.name, "circuit half-open, probing");
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.successes += 1;
            if inner.successes < self.config.success_threshold {
                return;
            }
            info!(breaker = %self.name, probes = inner.successes, "circuit closed");
        }
        inner.state = BreakerState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::Closed if inner.failures >= self.config.failure_threshold => {
                inner.state = BreakerState::Open;
                warn!(breaker = %self.name, failures = inner.failures, "circuit opened");
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                warn!(breaker = %self.name, "probe failed, circuit reopened");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.last_failure = None;
    }
}
