use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::time::Clock;
use crate::config::BreakerConfig;

/// Gate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation. Every call is allowed.
    Closed,
    /// Tripped. Calls are refused until the reset timeout has passed.
    Open,
    /// Cooling off. A single probe is let through to test recovery.
    HalfOpen,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed
    }
}

/// Point-in-time view of a breaker, safe to hand to dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub last_failure_unix_ms: Option<u64>,
}

/// Closed / open / half-open gate.
///
/// The failure count only resets on `record_success`; the breaker opens
/// once the count reaches the threshold and moves to half-open strictly
/// after `reset_timeout` has elapsed since the last failure.
///
/// Instances never share state. The scheduler and the observation
/// registry each own one with their own thresholds.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    clock: Arc<dyn Clock>,

    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_unix_ms: Option<u64>,
    // Half-open lets exactly one call through until an outcome is recorded.
    probe_issued: bool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            clock,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_unix_ms: None,
            probe_issued: false,
        }
    }

    /// Asks the gate for permission. May move `Open -> HalfOpen`.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = self
                    .last_failure
                    .map(|at| self.clock.now().saturating_duration_since(at) > self.reset_timeout)
                    .unwrap_or(true);

                if cooled {
                    info!(breaker = %self.name, "Circuit half-open, allowing probe");
                    self.state = CircuitState::HalfOpen;
                    self.probe_issued = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_issued {
                    false
                } else {
                    self.probe_issued = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit closed");
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.probe_issued = false;
    }

    /// Returns `true` when this failure tripped the breaker open.
    pub fn record_failure(&mut self) -> bool {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(self.clock.now());
        self.last_failure_unix_ms = Some(self.clock.unix_millis());
        self.probe_issued = false;

        match self.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, failures = self.failure_count, "Probe failed, circuit re-opened");
                self.state = CircuitState::Open;
                true
            }
            CircuitState::Closed if self.failure_count >= self.failure_threshold => {
                warn!(
                    breaker = %self.name,
                    failures = self.failure_count,
                    threshold = self.failure_threshold,
                    "Circuit opened"
                );
                self.state = CircuitState::Open;
                true
            }
            _ => {
                debug!(breaker = %self.name, failures = self.failure_count, "Failure recorded");
                false
            }
        }
    }

    /// Frees the half-open slot when its caller went away before recording
    /// an outcome, so the next caller is let through instead. No-op otherwise.
    pub fn release_half_open(&mut self) {
        if self.state == CircuitState::HalfOpen && self.probe_issued {
            debug!(breaker = %self.name, "Half-open call abandoned");
            self.probe_issued = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: self.state,
            failure_count: self.failure_count,
            failure_threshold: self.failure_threshold,
            reset_timeout_ms: self.reset_timeout.as_millis() as u64,
            last_failure_unix_ms: self.last_failure_unix_ms,
        }
    }
}
