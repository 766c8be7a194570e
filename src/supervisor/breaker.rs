//! Connection circuit breaker
//!
//! Closed until `failure_threshold` consecutive failures land within
//! `failure_window`; then Open for `cooldown`, refusing attempts outright.
//! After the cooldown exactly one probe is let through (HalfOpen): success
//! closes the circuit, failure opens it again.

use crate::config::BreakerConfig;
use crate::{Result, VoxError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { since: Instant },
    /// One probe attempt is in flight
    HalfOpen,
}

/// Coarse state for status reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BreakerPhase::Closed => "closed",
            BreakerPhase::Open => "open",
            BreakerPhase::HalfOpen => "half-open",
        };
        write!(f, "{}", name)
    }
}

pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            window: config.failure_window(),
            cooldown: config.cooldown(),
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
        }
    }

    /// Ask permission for one connection attempt
    pub fn try_acquire(&mut self) -> Result<()> {
        match self.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.cooldown {
                    info!("Circuit breaker half-open, allowing one probe");
                    self.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(VoxError::CircuitOpen {
                        retry_in_ms: (self.cooldown - elapsed).as_millis() as u64,
                    })
                }
            }
            CircuitState::HalfOpen => Err(VoxError::CircuitOpen { retry_in_ms: 0 }),
        }
    }

    pub fn record_success(&mut self) {
        if !matches!(self.state, CircuitState::Closed) {
            info!("Circuit breaker closed");
        }
        self.reset();
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();
        match self.state {
            CircuitState::Closed => {
                let stale = self
                    .last_failure
                    .is_some_and(|last| now.duration_since(last) > self.window);
                self.failures = if stale { 1 } else { self.failures + 1 };
                self.last_failure = Some(now);
                if self.failures >= self.threshold {
                    warn!(
                        "Circuit breaker open after {} consecutive failures",
                        self.failures
                    );
                    self.state = CircuitState::Open { since: now };
                }
            }
            CircuitState::HalfOpen => {
                warn!("Probe failed, circuit breaker open again");
                self.state = CircuitState::Open { since: now };
                self.last_failure = Some(now);
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// The in-flight probe was cancelled without an outcome; open again
    /// with the cooldown already served so the next attempt probes at once
    pub fn abandon_probe(&mut self) {
        if self.state == CircuitState::HalfOpen {
            info!("Probe abandoned, next attempt probes again");
            let since = Instant::now()
                .checked_sub(self.cooldown)
                .unwrap_or_else(Instant::now);
            self.state = CircuitState::Open { since };
        }
    }

    pub fn phase(&self) -> BreakerPhase {
        match self.state {
            CircuitState::Closed => BreakerPhase::Closed,
            CircuitState::Open { .. } => BreakerPhase::Open,
            CircuitState::HalfOpen => BreakerPhase::HalfOpen,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failures = 0;
        self.last_failure = None;
    }
}
