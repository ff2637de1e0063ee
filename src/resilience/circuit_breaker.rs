//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: one probe request tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: a call arrives after reset_timeout since the last failure
//! Half-Open → Closed: probe request succeeds (failure count reset)
//! Half-Open → Open: probe request fails (count keeps growing, timer restarts)
//! ```
//!
//! # Design Decisions
//! - One circuit per service route, created lazily on first use
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open; a probe that never reports back is
//!   replaced after another reset_timeout
//! - Transitions happen under the circuit's map entry lock and the lock is
//!   never held across the guarded call

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::CircuitBreakerConfig;
use crate::observability::{metrics, EventBus, GatewayEvent};

/// Mode of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The call was short-circuited; the operation never ran.
    #[error("circuit '{0}' is open")]
    Open(String),

    /// The operation ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }
}

#[derive(Debug, Clone)]
struct CircuitRecord {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    probe_started: Option<Instant>,
}

impl CircuitRecord {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
            last_success: None,
            probe_started: None,
        }
    }
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub ms_since_last_failure: Option<u64>,
    pub ms_since_last_success: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Pass,
    Probe,
    Reject,
}

/// Named circuits guarding outbound calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    enabled: bool,
    failure_threshold: u32,
    reset_timeout: Duration,
    circuits: DashMap<String, CircuitRecord>,
    events: EventBus,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, events: EventBus) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            circuits: DashMap::new(),
            events,
        }
    }

    /// Run `operation` through the circuit called `name`.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            return operation().await.map_err(CircuitError::Failed);
        }

        if self.admit(name, Instant::now()) == Admission::Reject {
            tracing::debug!(circuit = %name, "Circuit open, short-circuiting call");
            self.events.publish(GatewayEvent::CircuitRejected {
                circuit: name.to_string(),
            });
            return Err(CircuitError::Open(name.to_string()));
        }

        match operation().await {
            Ok(value) => {
                self.record_success(name, Instant::now());
                Ok(value)
            }
            Err(e) => {
                self.record_failure(name, Instant::now());
                Err(CircuitError::Failed(e))
            }
        }
    }

    /// Like [`execute`](Self::execute), but every error is turned into a
    /// value by `fallback`. Failure accounting happens before the fallback runs.
    pub async fn execute_with_fallback<T, E, F, Fut, Fb>(&self, name: &str, operation: F, fallback: Fb) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce(CircuitError<E>) -> T,
    {
        match self.execute(name, operation).await {
            Ok(value) => value,
            Err(e) => fallback(e),
        }
    }

    /// Current state of a circuit; circuits that never ran are closed.
    pub fn state(&self, name: &str) -> CircuitState {
        self.circuits
            .get(name)
            .map(|r| r.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn failures(&self, name: &str) -> u32 {
        self.circuits.get(name).map(|r| r.failures).unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let now = Instant::now();
        let since = |t: Option<Instant>| t.map(|t| now.saturating_duration_since(t).as_millis() as u64);

        let mut circuits: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|entry| CircuitSnapshot {
                name: entry.key().clone(),
                state: entry.state,
                failures: entry.failures,
                ms_since_last_failure: since(entry.last_failure),
                ms_since_last_success: since(entry.last_success),
            })
            .collect();
        circuits.sort_by(|a, b| a.name.cmp(&b.name));
        circuits
    }

    fn admit(&self, name: &str, now: Instant) -> Admission {
        let mut record = self
            .circuits
            .entry(name.to_string())
            .or_insert_with(CircuitRecord::new);

        let admission = match record.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::Open => {
                let cooled_down = record
                    .last_failure
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.reset_timeout);
                if cooled_down {
                    record.state = CircuitState::HalfOpen;
                    record.probe_started = Some(now);
                    Admission::Probe
                } else {
                    Admission::Reject
                }
            }
            CircuitState::HalfOpen => {
                let probe_stale = record
                    .probe_started
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.reset_timeout);
                if probe_stale {
                    record.probe_started = Some(now);
                    Admission::Probe
                } else {
                    Admission::Reject
                }
            }
        };
        drop(record);

        if admission == Admission::Probe {
            tracing::info!(circuit = %name, "Circuit half-open, admitting probe");
            metrics::record_circuit_transition(name, CircuitState::HalfOpen.as_str());
            self.events.publish(GatewayEvent::CircuitHalfOpen {
                circuit: name.to_string(),
            });
        }
        admission
    }

    fn record_success(&self, name: &str, now: Instant) {
        let mut record = self
            .circuits
            .entry(name.to_string())
            .or_insert_with(CircuitRecord::new);

        record.last_success = Some(now);
        let closed = match record.state {
            CircuitState::HalfOpen => {
                record.state = CircuitState::Closed;
                record.failures = 0;
                record.probe_started = None;
                true
            }
            CircuitState::Closed => {
                record.failures = 0;
                false
            }
            // A call admitted before the circuit opened finished late; the
            // open circuit keeps waiting for its own probe.
            CircuitState::Open => false,
        };
        drop(record);

        if closed {
            tracing::info!(circuit = %name, "Circuit closed");
            metrics::record_circuit_transition(name, CircuitState::Closed.as_str());
            self.events.publish(GatewayEvent::CircuitClosed {
                circuit: name.to_string(),
            });
        }
    }

    fn record_failure(&self, name: &str, now: Instant) {
        let mut record = self
            .circuits
            .entry(name.to_string())
            .or_insert_with(CircuitRecord::new);

        record.last_failure = Some(now);
        record.failures = record.failures.saturating_add(1);
        let opened = match record.state {
            CircuitState::Closed if record.failures >= self.failure_threshold => {
                record.state = CircuitState::Open;
                true
            }
            CircuitState::HalfOpen => {
                record.state = CircuitState::Open;
                record.probe_started = None;
                true
            }
            _ => false,
        };
        let failures = record.failures;
        drop(record);

        if opened {
            tracing::warn!(circuit = %name, failures, "Circuit opened");
            metrics::record_circuit_transition(name, CircuitState::Open.as_str());
            self.events.publish(GatewayEvent::CircuitOpened {
                circuit: name.to_string(),
                failures,
            });
        }
    }
}
