//! Circuit breaker guarding a downstream dependency.
//!
//! Callers check [`CircuitBreaker::is_open`] before the guarded operation and
//! report exactly one of [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`] per attempt. The breaker never raises
//! errors itself.
//!
//! # States
//!
//! - `Closed` - calls pass; reaching `threshold` failures opens the circuit
//! - `Open` - calls are refused until `reset_timeout` has elapsed since the
//!   last failure; the next `is_open` check then moves to `HalfOpen` and hands
//!   that caller the single trial slot
//! - `HalfOpen` - the trial is in flight and everyone else is refused; a
//!   success closes the circuit, a failure reopens it
//!
//! A success while `Closed` decrements the failure count by one instead of
//! clearing it.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Thread-safe circuit breaker shared by all callers of one dependency.
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    reset_timeout: Duration,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// A `threshold` of zero is treated as one.
    pub fn new(name: impl Into<String>, threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            reset_timeout,
            inner: RwLock::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_started: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.read().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.read().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    /// Returns whether calls must be refused.
    ///
    /// Side-effecting: when the circuit is open and the reset timeout has
    /// passed, this moves it to half-open and returns `false` to exactly one
    /// caller, who then owns the trial call. A trial that is never reported
    /// is handed out again after another reset timeout.
    pub fn is_open(&self) -> bool {
        {
            let inner = self.inner.read();
            if inner.state == BreakerState::Closed {
                return false;
            }
        }

        let inner = self.inner.upgradable_read();
        let now = Instant::now();

        match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .is_none_or(|at| now.duration_since(at) >= self.reset_timeout);
                if !cooled_down {
                    metrics::counter!("breaker_rejections_total", "breaker" => self.name.clone())
                        .increment(1);
                    return true;
                }

                let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
                inner.state = BreakerState::HalfOpen;
                inner.trial_started = Some(now);
                info!(breaker = %self.name, "Circuit half-open, allowing one trial call");
                false
            }
            BreakerState::HalfOpen => {
                let trial_expired = inner
                    .trial_started
                    .is_none_or(|at| now.duration_since(at) >= self.reset_timeout);
                if !trial_expired {
                    return true;
                }

                let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
                inner.trial_started = Some(now);
                warn!(breaker = %self.name, "Trial call never reported, granting a new one");
                false
            }
        }
    }

    /// Reports a successful guarded call.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.trial_started = None;
                info!(breaker = %self.name, "Circuit closed");
            }
            BreakerState::Closed if inner.failure_count > 0 => {
                inner.failure_count -= 1;
            }
            _ => {}
        }
    }

    /// Reports a failed guarded call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let trips = inner.state == BreakerState::HalfOpen
            || (inner.state == BreakerState::Closed && inner.failure_count >= self.threshold);

        if trips {
            inner.state = BreakerState::Open;
            inner.trial_started = None;
            metrics::counter!("breaker_trips_total", "breaker" => self.name.clone()).increment(1);
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "Circuit opened"
            );
        }
    }
}
