//! Instance health state machine.
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures >= unhealthy threshold
//! Unhealthy → Healthy: consecutive successes >= healthy threshold
//! ```
//!
//! These counters are separate from the circuit breaker's: a tripped circuit
//! says nothing about instance liveness, and vice versa.

use serde::Serialize;

use crate::config::HealthCheckConfig;

/// Consecutive-outcome thresholds for flipping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub unhealthy: u32,
    pub healthy: u32,
}

impl From<&HealthCheckConfig> for HealthThresholds {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            unhealthy: config.unhealthy_threshold,
            healthy: config.healthy_threshold,
        }
    }
}

/// A state change produced by [`HealthTracker::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameHealthy,
    BecameUnhealthy,
}

/// Liveness of one instance. New instances start healthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthTracker {
    healthy: bool,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            healthy: true,
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record one probe outcome and report a transition if one happened.
    pub fn record(&mut self, success: bool, thresholds: HealthThresholds) -> Option<HealthTransition> {
        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);

            if !self.healthy && self.consecutive_successes >= thresholds.healthy {
                self.healthy = true;
                self.consecutive_successes = 0;
                return Some(HealthTransition::BecameHealthy);
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);

            if self.healthy && self.consecutive_failures >= thresholds.unhealthy {
                self.healthy = false;
                self.consecutive_failures = 0;
                return Some(HealthTransition::BecameUnhealthy);
            }
        }
        None
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
